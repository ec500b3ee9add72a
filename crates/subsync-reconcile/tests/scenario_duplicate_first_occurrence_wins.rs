use chrono::{DateTime, TimeZone, Utc};
use subsync_reconcile::*;
use uuid::Uuid;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

#[test]
fn scenario_later_duplicate_never_affects_result() {
    let a = Uuid::from_u128(0xA);
    let snap = LocalSnapshot::from_records(
        "U1",
        vec![Subscription::new(a, "U1", "OFFER-BASIC", "ACTIVE", 0, ts(100))],
    );

    let first = VendorRecord::new(a, "ACTIVE", 10 * MICROS_SCALE);
    let mut dup = VendorRecord::new(a, "CANCELLED", 99 * MICROS_SCALE);
    dup.brand = Some("Other".to_string());

    let with_dup = merge(&snap, &[first.clone(), dup], MergeMode::MergeOnly, ts(200));
    let without = merge(&snap, &[first], MergeMode::MergeOnly, ts(200));

    assert_eq!(with_dup.updates, without.updates);
    assert_eq!(with_dup.duplicate_count(), 1);
    assert_eq!(
        with_dup.updates[0].vendor.status.as_deref(),
        Some("ACTIVE")
    );
    assert_eq!(with_dup.updates[0].vendor.brand, None);
}

#[test]
fn scenario_invalid_first_occurrence_still_shadows_later_valid_one() {
    let a = Uuid::from_u128(0xA);
    let snap = LocalSnapshot::from_records(
        "U1",
        vec![Subscription::new(a, "U1", "OFFER-BASIC", "ACTIVE", 0, ts(100))],
    );
    let mut broken = VendorRecord::new(a, "ACTIVE", 0);
    broken.vendor_status = None;
    let valid = VendorRecord::new(a, "ACTIVE", 1);

    let out = merge(&snap, &[broken, valid], MergeMode::MergeOnly, ts(200));
    assert!(out.is_noop());
    assert_eq!(out.invalid_count(), 1);
    assert_eq!(out.duplicate_count(), 1);
}
