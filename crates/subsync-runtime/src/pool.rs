//! Owner-keyed refresh execution.
//!
//! At most `max_concurrent` refreshes run at once across all owners. Per
//! owner, at most one refresh is in flight; submissions arriving meanwhile
//! collapse into a single follow-up run using the most recent id set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{BackgroundRefresher, RefreshOutcome};

/// What happened to a submission.
#[derive(Debug)]
pub enum RefreshTicket {
    /// A new worker was started; it resolves to every attempt it ran
    /// (the initial one plus any coalesced follow-up).
    Spawned(JoinHandle<Vec<RefreshOutcome>>),
    /// Folded into the in-flight worker for this owner.
    Coalesced,
}

/// Per-owner slot: present while a worker runs; holds the follow-up id set.
type InFlight = HashMap<String, Option<Vec<Uuid>>>;

#[derive(Clone)]
pub struct RefreshPool {
    refresher: BackgroundRefresher,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<InFlight>>,
}

fn lock(m: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the owner's slot if the worker unwinds before releasing it.
struct SlotGuard {
    in_flight: Arc<Mutex<InFlight>>,
    owner_id: String,
    armed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.in_flight).remove(&self.owner_id);
        }
    }
}

impl RefreshPool {
    pub fn new(refresher: BackgroundRefresher, max_concurrent: usize) -> Self {
        Self {
            refresher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Owners with a worker currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Queue a refresh for `owner_id`. Never waits on the refresh itself.
    pub fn submit(&self, owner_id: &str, public_ids: Vec<Uuid>) -> RefreshTicket {
        {
            let mut slots = lock(&self.in_flight);
            if let Some(pending) = slots.get_mut(owner_id) {
                *pending = Some(public_ids);
                tracing::debug!(owner_id, "refresh coalesced into in-flight worker");
                return RefreshTicket::Coalesced;
            }
            slots.insert(owner_id.to_string(), None);
        }

        let pool = self.clone();
        let owner = owner_id.to_string();
        RefreshTicket::Spawned(tokio::spawn(async move { pool.drive(owner, public_ids).await }))
    }

    async fn drive(self, owner_id: String, mut ids: Vec<Uuid>) -> Vec<RefreshOutcome> {
        let mut outcomes = Vec::new();
        let mut slot = SlotGuard {
            in_flight: Arc::clone(&self.in_flight),
            owner_id: owner_id.clone(),
            armed: true,
        };
        loop {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_closed) => {
                    tracing::warn!(owner_id = %owner_id, "refresh pool closed; dropping refresh");
                    return outcomes;
                }
            };
            let outcome = self.refresher.refresh_once(&owner_id, &ids).await;
            drop(permit);

            tracing::debug!(owner_id = %owner_id, outcome = outcome.as_str(), "refresh attempt finished");
            outcomes.push(outcome);

            let next = {
                let mut slots = lock(&self.in_flight);
                let next = slots.get_mut(&owner_id).and_then(Option::take);
                if next.is_none() {
                    slots.remove(&owner_id);
                    slot.armed = false;
                }
                next
            };
            match next {
                Some(latest) => ids = latest,
                None => return outcomes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use subsync_db::MemStore;
    use subsync_errors::{ClassifierTable, VendorFailure};
    use subsync_reconcile::vendor_adapter::VendorBatch;
    use subsync_reconcile::IsolationMode;
    use subsync_vendor::VendorGateway;

    use crate::ConsistencyController;

    /// Panics on the first call, returns an empty batch afterwards.
    #[derive(Default)]
    struct PanicOnceVendor {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VendorGateway for PanicOnceVendor {
        fn source_name(&self) -> &'static str {
            "panic-once"
        }

        async fn fetch(&self, _owner_id: &str, _public_ids: &[Uuid]) -> Result<VendorBatch, VendorFailure> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("vendor exploded");
            }
            Ok(VendorBatch::default())
        }
    }

    fn pool(vendor: Arc<PanicOnceVendor>) -> RefreshPool {
        let controller = Arc::new(ConsistencyController::new(
            Arc::new(MemStore::new()),
            IsolationMode::SerializableSnapshot,
            10,
        ));
        let refresher = BackgroundRefresher::new(
            vendor,
            controller,
            Arc::new(ClassifierTable::default()),
            Duration::from_millis(100),
        );
        RefreshPool::new(refresher, 2)
    }

    #[tokio::test]
    async fn panicking_worker_releases_owner_slot() {
        let vendor = Arc::new(PanicOnceVendor::default());
        let pool = pool(vendor.clone());
        let id = Uuid::from_u128(1);

        let RefreshTicket::Spawned(handle) = pool.submit("U1", vec![id]) else {
            panic!("first submit must spawn");
        };
        assert!(handle.await.is_err());
        assert_eq!(pool.in_flight(), 0);

        let RefreshTicket::Spawned(handle) = pool.submit("U1", vec![id]) else {
            panic!("owner must be refreshable again after a panic");
        };
        let outcomes = handle.await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(vendor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.in_flight(), 0);
    }
}
