use std::time::Duration;

use subsync_db::StoreError;
use subsync_errors::{ClassifierTable, DomainError, ErrorContext, VendorFailure};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("owner id must not be blank")]
    BlankOwner,
    #[error(transparent)]
    Vendor(#[from] VendorFailure),
    #[error("vendor call exceeded deadline of {0:?}")]
    VendorTimeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Map to the client-facing error for `owner_id`.
    pub fn classify(&self, table: &ClassifierTable, owner_id: &str) -> DomainError {
        let ctx = ErrorContext::for_customer(owner_id);
        match self {
            SyncError::BlankOwner => DomainError::missing_owner_header(),
            SyncError::Vendor(f) => table.classify(f, &ctx),
            SyncError::VendorTimeout(d) => table.classify(
                &VendorFailure::Transport(format!("deadline of {d:?} exceeded")),
                &ctx,
            ),
            SyncError::Store(e @ StoreError::Conflict { .. }) => {
                DomainError::sync_conflict(&ctx, e.to_string())
            }
            SyncError::Store(e @ StoreError::Backend(_)) => DomainError::unexpected(&ctx, e.to_string()),
        }
    }
}
