use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use subsync_config::SyncConfig;
use subsync_db::SubscriptionStore;
use subsync_errors::{ClassifierTable, DomainError};
use subsync_reconcile::vendor_adapter::VendorBatch;
use subsync_reconcile::{IsolationMode, MergeMode, Subscription};
use subsync_vendor::VendorGateway;

use crate::{BackgroundRefresher, ConsistencyController, CycleReport, RefreshPool, SyncError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub isolation: IsolationMode,
    pub chunk_size: usize,
    /// Bounds the vendor call of one background refresh.
    pub refresh_deadline: Duration,
    /// Bounds the vendor call of full sync and fetch.
    pub sync_timeout: Duration,
    pub max_concurrent_refreshes: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::default(),
            chunk_size: 500,
            refresh_deadline: Duration::from_millis(200),
            sync_timeout: Duration::from_secs(10),
            max_concurrent_refreshes: 8,
        }
    }
}

impl From<&SyncConfig> for ServiceSettings {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            isolation: cfg.sync.isolation,
            chunk_size: cfg.sync.chunk_size,
            refresh_deadline: Duration::from_millis(cfg.vendor.timeout_ms),
            sync_timeout: Duration::from_millis(cfg.vendor.sync_timeout_ms),
            max_concurrent_refreshes: cfg.refresh.max_concurrent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResult {
    pub report: CycleReport,
    pub subscriptions: Vec<Subscription>,
}

/// Owner-facing operations. Every error that leaves this type is already
/// classified into a [`DomainError`].
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    vendor: Arc<dyn VendorGateway>,
    classifier: Arc<ClassifierTable>,
    controller: Arc<ConsistencyController>,
    pool: RefreshPool,
    sync_timeout: Duration,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        vendor: Arc<dyn VendorGateway>,
        classifier: Arc<ClassifierTable>,
        settings: ServiceSettings,
    ) -> Self {
        let controller = Arc::new(ConsistencyController::new(
            Arc::clone(&store),
            settings.isolation,
            settings.chunk_size,
        ));
        let refresher = BackgroundRefresher::new(
            Arc::clone(&vendor),
            Arc::clone(&controller),
            Arc::clone(&classifier),
            settings.refresh_deadline,
        );
        Self {
            store,
            vendor,
            classifier,
            controller,
            pool: RefreshPool::new(refresher, settings.max_concurrent_refreshes),
            sync_timeout: settings.sync_timeout,
        }
    }

    pub fn pool(&self) -> &RefreshPool {
        &self.pool
    }

    pub fn controller(&self) -> &Arc<ConsistencyController> {
        &self.controller
    }

    pub fn classifier(&self) -> &ClassifierTable {
        &self.classifier
    }

    /// Return the local snapshot as-is and queue a merge-only refresh for the
    /// ids in it. The caller never waits on the vendor.
    pub async fn read_and_refresh(&self, owner_id: &str) -> Result<Vec<Subscription>, DomainError> {
        let owner_id = checked_owner(owner_id)?;
        let snapshot = self
            .store
            .find_by_owner(owner_id)
            .await
            .map_err(|e| SyncError::from(e).classify(&self.classifier, owner_id))?;

        if !snapshot.is_empty() {
            let ids = snapshot.iter().map(|s| s.public_id).collect();
            self.pool.submit(owner_id, ids);
        }
        Ok(snapshot)
    }

    /// Fetch everything the vendor holds for the owner, run a full-sync cycle
    /// and return the committed state.
    pub async fn full_sync(&self, owner_id: &str) -> Result<FullSyncResult, DomainError> {
        let owner_id = checked_owner(owner_id)?;
        self.full_sync_inner(owner_id)
            .await
            .map_err(|e| e.classify(&self.classifier, owner_id))
    }

    async fn full_sync_inner(&self, owner_id: &str) -> Result<FullSyncResult, SyncError> {
        let batch = self.fetch_within_deadline(owner_id).await?;
        if !batch.issues.is_empty() {
            tracing::warn!(
                owner_id,
                rejected = batch.issues.len(),
                "vendor entries rejected by adapter"
            );
        }
        let report = self
            .controller
            .run_cycle(owner_id, &batch.records, MergeMode::FullSync)
            .await?;
        let subscriptions = self.store.find_by_owner(owner_id).await?;
        Ok(FullSyncResult {
            report,
            subscriptions,
        })
    }

    /// Vendor passthrough; no store access.
    pub async fn fetch_vendor(&self, owner_id: &str) -> Result<VendorBatch, DomainError> {
        let owner_id = checked_owner(owner_id)?;
        self.fetch_within_deadline(owner_id)
            .await
            .map_err(|e| e.classify(&self.classifier, owner_id))
    }

    async fn fetch_within_deadline(&self, owner_id: &str) -> Result<VendorBatch, SyncError> {
        match tokio::time::timeout(self.sync_timeout, self.vendor.fetch(owner_id, &[])).await {
            Err(_elapsed) => Err(SyncError::VendorTimeout(self.sync_timeout)),
            Ok(res) => Ok(res?),
        }
    }
}

fn checked_owner(owner_id: &str) -> Result<&str, DomainError> {
    let trimmed = owner_id.trim();
    if trimmed.is_empty() {
        return Err(DomainError::missing_owner_header());
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use subsync_db::MemStore;
    use subsync_errors::{ErrorKind, VendorFailure};
    use subsync_reconcile::{VendorRecord, MICROS_SCALE};
    use uuid::Uuid;

    struct StubVendor {
        result: Result<Vec<VendorRecord>, VendorFailure>,
        delay: Duration,
        calls: Mutex<Vec<Vec<Uuid>>>,
    }

    impl StubVendor {
        fn ok(records: Vec<VendorRecord>) -> Self {
            Self {
                result: Ok(records),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(f: VendorFailure) -> Self {
            Self {
                result: Err(f),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl VendorGateway for StubVendor {
        fn source_name(&self) -> &'static str {
            "stub"
        }

        async fn fetch(&self, _owner_id: &str, public_ids: &[Uuid]) -> Result<VendorBatch, VendorFailure> {
            self.calls.lock().unwrap().push(public_ids.to_vec());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone().map(|records| VendorBatch {
                records,
                issues: Vec::new(),
            })
        }
    }

    fn settings() -> ServiceSettings {
        ServiceSettings {
            isolation: IsolationMode::SerializableSnapshot,
            chunk_size: 2,
            refresh_deadline: Duration::from_millis(50),
            sync_timeout: Duration::from_millis(100),
            max_concurrent_refreshes: 2,
        }
    }

    fn service(store: &MemStore, vendor: StubVendor) -> (SubscriptionService, Arc<StubVendor>) {
        let vendor = Arc::new(vendor);
        let svc = SubscriptionService::new(
            Arc::new(store.clone()),
            vendor.clone(),
            Arc::new(ClassifierTable::default()),
            settings(),
        );
        (svc, vendor)
    }

    fn offered(n: u128) -> VendorRecord {
        let mut r = VendorRecord::new(Uuid::from_u128(n), "ACTIVE", 25 * MICROS_SCALE);
        r.offer_id = Some("OFFER-BASIC".to_string());
        r
    }

    #[tokio::test]
    async fn full_sync_creates_and_returns_committed_state() {
        let store = MemStore::new();
        let (svc, vendor) = service(&store, StubVendor::ok(vec![offered(1), offered(2), offered(3)]));

        let res = svc.full_sync("U1").await.unwrap();
        assert_eq!(res.report.created, 3);
        assert_eq!(res.subscriptions.len(), 3);
        assert!(res.subscriptions.iter().all(|s| s.owner_id == "U1"));
        // whole owner scope requested
        assert_eq!(vendor.calls.lock().unwrap().as_slice(), &[Vec::<Uuid>::new()]);
    }

    #[tokio::test]
    async fn blank_owner_is_missing_header() {
        let store = MemStore::new();
        let (svc, vendor) = service(&store, StubVendor::ok(vec![]));
        let err = svc.read_and_refresh("   ").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingOwnerHeader);
        assert_eq!(err.http_status, 400);
        assert!(vendor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vendor_404_classified_with_owner_param() {
        let store = MemStore::new();
        let (svc, _) = service(
            &store,
            StubVendor::failing(VendorFailure::Http {
                status: 404,
                message: "Not Found".into(),
                body: String::new(),
            }),
        );
        let err = svc.full_sync("U1").await.unwrap_err();
        assert_eq!((err.kind, err.http_status), (ErrorKind::NotFound, 404));
        assert_eq!(err.params.get("customerId").map(String::as_str), Some("U1"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn slow_vendor_times_out_as_unavailable() {
        let store = MemStore::new();
        let mut stub = StubVendor::ok(vec![offered(1)]);
        stub.delay = Duration::from_millis(500);
        let (svc, _) = service(&store, stub);

        let err = svc.fetch_vendor("U1").await.unwrap_err();
        assert_eq!((err.kind, err.http_status), (ErrorKind::TemporarilyUnavailable, 503));
    }

    #[tokio::test]
    async fn full_sync_waits_past_the_refresh_deadline() {
        let store = MemStore::new();
        let mut stub = StubVendor::ok(vec![offered(1)]);
        stub.delay = Duration::from_millis(300);
        let vendor = Arc::new(stub);
        let svc = SubscriptionService::new(
            Arc::new(store.clone()),
            vendor,
            Arc::new(ClassifierTable::default()),
            ServiceSettings::default(),
        );

        let res = svc.full_sync("U1").await.unwrap();
        assert_eq!(res.report.created, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn settings_follow_config_deadlines() {
        let mut cfg = SyncConfig::default();
        cfg.vendor.timeout_ms = 150;
        cfg.vendor.sync_timeout_ms = 4_000;
        cfg.sync.chunk_size = 50;

        let s = ServiceSettings::from(&cfg);
        assert_eq!(s.refresh_deadline, Duration::from_millis(150));
        assert_eq!(s.sync_timeout, Duration::from_secs(4));
        assert_eq!(s.chunk_size, 50);
        assert_eq!(ServiceSettings::from(&SyncConfig::default()), ServiceSettings::default());
    }

    #[tokio::test]
    async fn read_returns_snapshot_and_skips_refresh_when_empty() {
        let store = MemStore::new();
        let (svc, vendor) = service(&store, StubVendor::ok(vec![]));
        let subs = svc.read_and_refresh("U1").await.unwrap();
        assert!(subs.is_empty());
        assert_eq!(svc.pool().in_flight(), 0);
        assert!(vendor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_returns_pre_refresh_snapshot() {
        let store = MemStore::new();
        let created = Utc.timestamp_opt(100, 0).single().unwrap();
        store
            .insert(&Subscription::new(
                Uuid::from_u128(1),
                "U1",
                "OFFER-BASIC",
                "ACTIVE",
                0,
                created,
            ))
            .await
            .unwrap();
        let (svc, _) = service(&store, StubVendor::ok(vec![offered(1)]));

        let subs = svc.read_and_refresh("U1").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].vendor.status.is_none());
    }
}
