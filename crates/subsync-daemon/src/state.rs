//! Shared runtime state for subsync-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything here is
//! built once at startup; nothing is mutated afterwards.

use std::sync::Arc;

use anyhow::Result;
use subsync_config::SyncConfig;
use subsync_db::SubscriptionStore;
use subsync_errors::MessageCatalog;
use subsync_runtime::{ServiceSettings, SubscriptionService};
use subsync_vendor::VendorGateway;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            service: "subsync-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub service: SubscriptionService,
    /// Renders client-facing error messages.
    pub catalog: Arc<MessageCatalog>,
    pub store_backend: &'static str,
    pub vendor_source: &'static str,
}

impl AppState {
    pub fn new(
        service: SubscriptionService,
        catalog: MessageCatalog,
        store_backend: &'static str,
        vendor_source: &'static str,
    ) -> Self {
        Self {
            build: BuildInfo::current(),
            service,
            catalog: Arc::new(catalog),
            store_backend,
            vendor_source,
        }
    }

    /// Wire the service from a validated config.
    pub fn from_config(
        cfg: &SyncConfig,
        store: Arc<dyn SubscriptionStore>,
        vendor: Arc<dyn VendorGateway>,
    ) -> Result<Self> {
        let store_backend = store.backend_name();
        let vendor_source = vendor.source_name();
        let service = SubscriptionService::new(
            store,
            vendor,
            Arc::new(cfg.classifier()?),
            ServiceSettings::from(cfg),
        );
        Ok(Self::new(service, cfg.catalog()?, store_backend, vendor_source))
    }
}
