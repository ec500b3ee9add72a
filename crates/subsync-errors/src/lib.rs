//! subsync-errors
//!
//! Domain error taxonomy for the subscription sync service:
//! - [`ErrorKind`]: the fixed set of kinds surfaced to clients
//! - [`VendorFailure`]: what a vendor call can fail with
//! - [`ClassifierTable`]: status-code keyed dispatch, built once, fail-fast on
//!   duplicate registration
//! - [`MessageCatalog`]: `{param}` templates per kind
//! - [`ErrorResponse`]: the structured error body

mod catalog;
mod classifier;
mod kind;
mod response;

pub use catalog::MessageCatalog;
pub use classifier::{ClassifierBuilder, ClassifierError, ClassifierTable, StatusClasses, StatusHandler};
pub use kind::{DomainError, ErrorContext, ErrorKind, LogLevel, VendorFailure};
pub use response::{new_error_id, ErrorResponse, DEFAULT_LOCALE};

/// Context parameter carrying the owner id in message templates.
pub const PARAM_CUSTOMER_ID: &str = "customerId";
