//! Vendor failure classification.
//!
//! Handlers are keyed by HTTP status code and registered once at startup.
//! Registering the same status twice is a configuration error surfaced by
//! [`ClassifierBuilder::register`]; the table never picks one silently.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{DomainError, ErrorContext, ErrorKind, LogLevel, VendorFailure};

/// HTTP status used when the vendor answers with an unregistered status.
pub const UNKNOWN_STATUS_HTTP: u16 = 502;
/// HTTP status used when the vendor could not be reached at all.
pub const TRANSPORT_FAILURE_HTTP: u16 = 503;
/// HTTP status used when the vendor body could not be decoded.
pub const DECODE_FAILURE_HTTP: u16 = 502;

/// What one registered vendor status turns into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusHandler {
    pub kind: ErrorKind,
    pub http_status: u16,
    pub log_level: LogLevel,
}

impl StatusHandler {
    pub fn warn(kind: ErrorKind, http_status: u16) -> Self {
        Self {
            kind,
            http_status,
            log_level: LogLevel::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("duplicate handler for vendor status {status}: {existing} already registered, refusing {attempted}")]
    DuplicateHandler {
        status: u16,
        existing: ErrorKind,
        attempted: ErrorKind,
    },
    #[error("unknown error kind '{0}' in message overrides")]
    UnknownMessageKey(String),
}

/// Vendor status code per classified kind (config `errors.status_classes`).
///
/// The response status equals the vendor status for every registered class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusClasses {
    pub invalid_request: u16,
    pub forbidden: u16,
    pub not_found: u16,
    pub temporarily_unavailable: u16,
    pub external_internal_error: u16,
}

impl Default for StatusClasses {
    fn default() -> Self {
        Self {
            invalid_request: 400,
            forbidden: 403,
            not_found: 404,
            temporarily_unavailable: 409,
            external_internal_error: 500,
        }
    }
}

impl StatusClasses {
    fn pairs(&self) -> [(u16, ErrorKind); 5] {
        [
            (self.invalid_request, ErrorKind::InvalidRequest),
            (self.forbidden, ErrorKind::Forbidden),
            (self.not_found, ErrorKind::NotFound),
            (self.temporarily_unavailable, ErrorKind::TemporarilyUnavailable),
            (self.external_internal_error, ErrorKind::ExternalInternalError),
        ]
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ClassifierBuilder {
    handlers: BTreeMap<u16, StatusHandler>,
}

impl ClassifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, status: u16, handler: StatusHandler) -> Result<Self, ClassifierError> {
        if let Some(existing) = self.handlers.get(&status) {
            return Err(ClassifierError::DuplicateHandler {
                status,
                existing: existing.kind,
                attempted: handler.kind,
            });
        }
        self.handlers.insert(status, handler);
        Ok(self)
    }

    pub fn build(self) -> ClassifierTable {
        ClassifierTable {
            handlers: self.handlers,
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Immutable status → handler table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierTable {
    handlers: BTreeMap<u16, StatusHandler>,
}

impl ClassifierTable {
    pub fn from_status_classes(classes: &StatusClasses) -> Result<Self, ClassifierError> {
        let mut b = ClassifierBuilder::new();
        for (status, kind) in classes.pairs() {
            b = b.register(status, StatusHandler::warn(kind, status))?;
        }
        Ok(b.build())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handler_for(&self, status: u16) -> Option<&StatusHandler> {
        self.handlers.get(&status)
    }

    pub fn classify(&self, failure: &VendorFailure, ctx: &ErrorContext) -> DomainError {
        match failure {
            VendorFailure::Http { status, message, body } => {
                let detail = format!("vendor status {status}: {message}; body: {body}");
                match self.handlers.get(status) {
                    Some(h) => DomainError::new(h.kind, h.http_status, h.log_level, ctx, detail),
                    None => DomainError::new(
                        ErrorKind::UnknownExternalError,
                        UNKNOWN_STATUS_HTTP,
                        LogLevel::Warn,
                        ctx,
                        detail,
                    ),
                }
            }
            VendorFailure::Transport(msg) => DomainError::new(
                ErrorKind::TemporarilyUnavailable,
                TRANSPORT_FAILURE_HTTP,
                LogLevel::Warn,
                ctx,
                format!("vendor unreachable: {msg}"),
            ),
            VendorFailure::Decode(msg) => DomainError::new(
                ErrorKind::ExternalInternalError,
                DECODE_FAILURE_HTTP,
                LogLevel::Warn,
                ctx,
                format!("vendor body undecodable: {msg}"),
            ),
        }
    }
}

impl Default for ClassifierTable {
    fn default() -> Self {
        let handlers = StatusClasses::default()
            .pairs()
            .into_iter()
            .map(|(status, kind)| (status, StatusHandler::warn(kind, status)))
            .collect();
        Self { handlers }
    }
}
