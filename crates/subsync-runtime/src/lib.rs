//! subsync-runtime
//!
//! Reconciliation cycle orchestration on top of the pure engine:
//! - [`ConsistencyController`]: read, merge, write and commit one owner scope
//!   atomically under a chosen [`subsync_reconcile::IsolationMode`]
//! - [`BackgroundRefresher`]: one deadline-bounded, merge-only refresh attempt
//! - [`RefreshPool`]: bounded, owner-keyed execution of refreshes
//! - [`SubscriptionService`]: the read / full-sync / vendor-fetch operations

mod controller;
mod error;
mod pool;
mod refresher;
mod service;

pub use controller::{ConsistencyController, CycleReport};
pub use error::SyncError;
pub use pool::{RefreshPool, RefreshTicket};
pub use refresher::{BackgroundRefresher, RefreshOutcome};
pub use service::{FullSyncResult, ServiceSettings, SubscriptionService};
