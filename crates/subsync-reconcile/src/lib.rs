//! subsync-reconcile
//!
//! Subscription reconciliation engine.
//!
//! Merges a vendor batch into a local owner-scoped snapshot:
//! - First occurrence of a `public_id` in a batch wins; later ones are dropped
//! - Matching records get vendor fields merged and `updated_at` advanced
//! - Vendor-only ids are dropped (merge-only) or materialized (full-sync)
//! - Records missing required fields are reported and never written
//!
//! Deterministic, pure logic. No IO. No vendor calls. No store access.

mod clock;
mod engine;
mod types;
pub mod vendor_adapter;

pub use clock::next_updated_at;
pub use engine::{apply_vendor_fields, materialize, merge};
pub use types::*;
