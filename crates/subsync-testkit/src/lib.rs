//! subsync-testkit
//!
//! Test doubles and fixtures shared by the scenario tests under `tests/`:
//! - [`FakeVendor`]: in-process [`subsync_vendor::VendorGateway`] driven by an
//!   explicit [`FaultPlan`]
//! - fixture loaders and store seeding helpers

mod fake_vendor;

pub use fake_vendor::{DuplicateFault, FakeVendor, FaultPlan, FetchCall};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use subsync_db::{MemStore, SubscriptionStore};
use subsync_reconcile::vendor_adapter::{normalize_json, VendorBatch};
use subsync_reconcile::Subscription;
use uuid::Uuid;

/// Deterministic id for fixture record `n`.
pub fn fixture_id(n: u128) -> Uuid {
    Uuid::from_u128(0x5ab5_0000_0000_4000_8000_0000_0000_0000 | n)
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
}

/// Never-synced record as the owner would have created it.
pub fn owner_record(owner_id: &str, public_id: Uuid, offer_id: &str) -> Subscription {
    Subscription::new(public_id, owner_id, offer_id, "PENDING", 0, ts(1_700_000_000))
}

/// Insert `records` into a fresh [`MemStore`].
pub async fn seeded_store(records: &[Subscription]) -> Result<MemStore> {
    let store = MemStore::new();
    for r in records {
        store
            .insert(r)
            .await
            .with_context(|| format!("seed {}", r.public_id))?;
    }
    Ok(store)
}

/// Parse a vendor response body from disk through the wire adapter.
pub fn load_vendor_batch_json(path: &str) -> Result<VendorBatch> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read vendor fixture: {path}"))?;
    normalize_json(&s).with_context(|| format!("parse vendor fixture: {path}"))
}

/// Path of a file under this crate's `fixtures/` directory.
pub fn fixture_path(name: &str) -> String {
    format!("{}/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}
