//! subsync-vendor
//!
//! Vendor boundary: the [`VendorGateway`] trait and the reqwest-backed
//! [`HttpVendorGateway`]. This crate does not touch the store; callers hand
//! the fetched batch to the reconcile engine.

mod http;

pub use http::{HttpVendorGateway, OWNER_HEADER, SUBSCRIPTIONS_PATH};

use subsync_errors::VendorFailure;
use subsync_reconcile::vendor_adapter::VendorBatch;
use uuid::Uuid;

/// Pluggable vendor interface.
///
/// `public_ids` narrows the request to those records; an empty slice asks for
/// everything the vendor holds for `owner_id`. The returned batch may be
/// empty, unordered relative to the request, and may contain duplicate or
/// unknown ids.
#[async_trait::async_trait]
pub trait VendorGateway: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch(&self, owner_id: &str, public_ids: &[Uuid]) -> Result<VendorBatch, VendorFailure>;
}
