//! Scriptable vendor double.
//!
//! Holds per-owner records and applies a [`FaultPlan`] on every fetch. All
//! fault behaviour lives here, never in the engine or the HTTP gateway.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use subsync_errors::VendorFailure;
use subsync_reconcile::vendor_adapter::VendorBatch;
use subsync_reconcile::VendorRecord;
use subsync_vendor::VendorGateway;
use uuid::Uuid;

/// Repeat `public_id` after its original, with different values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateFault {
    pub public_id: Uuid,
    pub vendor_status: String,
    pub vendor_balance_micros: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FaultPlan {
    /// Sleep before answering.
    pub delay: Option<Duration>,
    /// Answer with this failure instead of data.
    pub failure: Option<VendorFailure>,
    pub duplicates: Vec<DuplicateFault>,
    /// Appended as well-formed records the store has never seen.
    pub unknown_ids: Vec<Uuid>,
    /// Records returned with their status stripped.
    pub corrupted: Vec<Uuid>,
    /// Replace the stored record for an id wholesale.
    pub overrides: BTreeMap<Uuid, VendorRecord>,
}

impl FaultPlan {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(failure: VendorFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    pub fn http_status(status: u16, message: &str) -> Self {
        Self::failing(VendorFailure::Http {
            status,
            message: message.to_string(),
            body: String::new(),
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One observed `fetch` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCall {
    pub owner_id: String,
    pub public_ids: Vec<Uuid>,
}

#[derive(Default)]
pub struct FakeVendor {
    records: Mutex<HashMap<String, Vec<VendorRecord>>>,
    plan: Mutex<FaultPlan>,
    calls: Mutex<Vec<FetchCall>>,
}

impl FakeVendor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(owner_id: &str, records: Vec<VendorRecord>) -> Self {
        let v = Self::new();
        v.set_records(owner_id, records);
        v
    }

    pub fn set_records(&self, owner_id: &str, records: Vec<VendorRecord>) {
        lock(&self.records).insert(owner_id.to_string(), records);
    }

    pub fn set_plan(&self, plan: FaultPlan) {
        *lock(&self.plan) = plan;
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn answer(&self, owner_id: &str, public_ids: &[Uuid], plan: &FaultPlan) -> Vec<VendorRecord> {
        let stored = lock(&self.records).get(owner_id).cloned().unwrap_or_default();

        let mut out = Vec::new();
        for rec in stored {
            if !public_ids.is_empty() && !public_ids.contains(&rec.public_id) {
                continue;
            }
            let mut rec = plan.overrides.get(&rec.public_id).cloned().unwrap_or(rec);
            if plan.corrupted.contains(&rec.public_id) {
                rec.vendor_status = None;
            }
            let id = rec.public_id;
            out.push(rec.clone());

            for d in plan.duplicates.iter().filter(|d| d.public_id == id) {
                let mut dup = rec.clone();
                dup.vendor_status = Some(d.vendor_status.clone());
                dup.vendor_balance_micros = Some(d.vendor_balance_micros);
                out.push(dup);
            }
        }

        for id in &plan.unknown_ids {
            let mut rec = VendorRecord::new(*id, "ACTIVE", 0);
            rec.offer_id = Some("OFFER-UNKNOWN".to_string());
            out.push(rec);
        }
        out
    }
}

#[async_trait::async_trait]
impl VendorGateway for FakeVendor {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, owner_id: &str, public_ids: &[Uuid]) -> Result<VendorBatch, VendorFailure> {
        lock(&self.calls).push(FetchCall {
            owner_id: owner_id.to_string(),
            public_ids: public_ids.to_vec(),
        });
        let plan = lock(&self.plan).clone();

        if let Some(d) = plan.delay {
            tokio::time::sleep(d).await;
        }
        if let Some(f) = plan.failure {
            return Err(f);
        }
        Ok(VendorBatch {
            records: self.answer(owner_id, public_ids, &plan),
            issues: Vec::new(),
        })
    }
}
