//! Scenario: full-sync of an empty owner scope from a recorded vendor body
//! (legacy field spellings, decimal string balances, a duplicate, an invalid
//! entry and a malformed id).

use std::sync::Arc;

use subsync_errors::ClassifierTable;
use subsync_reconcile::vendor_adapter::AdapterIssue;
use subsync_reconcile::MICROS_SCALE;
use subsync_runtime::{ServiceSettings, SubscriptionService};
use subsync_testkit::{fixture_id, fixture_path, load_vendor_batch_json, ts, FakeVendor};

#[tokio::test]
async fn creates_valid_first_occurrences_only() {
    let batch = load_vendor_batch_json(&fixture_path("vendor_u1_full.json")).unwrap();
    assert_eq!(batch.records.len(), 4);
    assert!(matches!(batch.issues[..], [AdapterIssue::InvalidPublicId { index: 4, .. }]));

    let store = subsync_db::MemStore::new();
    let svc = SubscriptionService::new(
        Arc::new(store.clone()),
        Arc::new(FakeVendor::with_records("U1", batch.records)),
        Arc::new(ClassifierTable::default()),
        ServiceSettings::default(),
    );

    let res = svc.full_sync("U1").await.unwrap();
    assert_eq!(res.report.created, 2);
    assert_eq!(res.report.duplicates, 1);
    assert_eq!(res.report.invalid, 1);
    assert_eq!(res.subscriptions.len(), 2);

    let a = res
        .subscriptions
        .iter()
        .find(|s| s.public_id == fixture_id(1))
        .unwrap();
    assert_eq!(a.owner_id, "U1");
    assert_eq!(a.offer_id, "OFFER-BASIC");
    assert_eq!(a.vendor.status.as_deref(), Some("ACTIVE"));
    assert_eq!(a.vendor.balance_micros, Some(25 * MICROS_SCALE + MICROS_SCALE / 2));
    assert_eq!(a.vendor.usage_count, Some(12));
    assert_eq!(a.vendor.brand.as_deref(), Some("Streamly"));
    assert_eq!(
        a.vendor.logo_url.as_deref(),
        Some("https://cdn.vendor.example/logo/basic.png")
    );
    assert_eq!(a.vendor.last_sync_time, Some(ts(1_709_288_100)));

    // second run against the same vendor data is a pure update pass
    let again = svc.full_sync("U1").await.unwrap();
    assert_eq!((again.report.created, again.report.updated), (0, 2));
    assert_eq!(store.len(), 2);
}
