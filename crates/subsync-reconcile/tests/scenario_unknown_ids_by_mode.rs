use chrono::{DateTime, TimeZone, Utc};
use subsync_reconcile::*;
use uuid::Uuid;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn snapshot() -> LocalSnapshot {
    LocalSnapshot::from_records(
        "U1",
        vec![Subscription::new(
            Uuid::from_u128(1),
            "U1",
            "OFFER-BASIC",
            "ACTIVE",
            0,
            ts(100),
        )],
    )
}

fn vendor_only() -> VendorRecord {
    let mut r = VendorRecord::new(Uuid::from_u128(42), "ACTIVE", 3 * MICROS_SCALE);
    r.offer_id = Some("OFFER-PREMIUM".to_string());
    r
}

#[test]
fn scenario_merge_only_leaves_snapshot_unchanged_for_unknown_id() {
    let mut snap = snapshot();
    let before = snap.clone();

    let out = merge(&snap, &[vendor_only()], MergeMode::MergeOnly, ts(200));
    assert!(out.is_noop());
    assert_eq!(
        out.anomalies,
        vec![MergeAnomaly::UnknownPublicId {
            public_id: Uuid::from_u128(42)
        }]
    );

    snap.apply(&out);
    assert_eq!(snap, before);
}

#[test]
fn scenario_full_sync_adds_exactly_one_record_for_unknown_id() {
    let mut snap = snapshot();
    let out = merge(&snap, &[vendor_only()], MergeMode::FullSync, ts(200));
    assert_eq!(out.creates.len(), 1);
    assert!(out.updates.is_empty());

    snap.apply(&out);
    assert_eq!(snap.len(), 2);
    let created = &snap.records[&Uuid::from_u128(42)];
    assert_eq!(created.owner_id, "U1");
    assert_eq!(created.vendor.status.as_deref(), Some("ACTIVE"));
    assert_eq!(created.vendor.balance_micros, Some(3 * MICROS_SCALE));
}
