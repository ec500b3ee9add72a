use std::collections::BTreeMap;

use serde::Serialize;

use crate::PARAM_CUSTOMER_ID;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    Forbidden,
    NotFound,
    TemporarilyUnavailable,
    ExternalInternalError,
    UnknownExternalError,
    SyncConflict,
    MissingOwnerHeader,
    UnexpectedError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::InvalidRequest,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::TemporarilyUnavailable,
        ErrorKind::ExternalInternalError,
        ErrorKind::UnknownExternalError,
        ErrorKind::SyncConflict,
        ErrorKind::MissingOwnerHeader,
        ErrorKind::UnexpectedError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid-request",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::TemporarilyUnavailable => "temporarily-unavailable",
            ErrorKind::ExternalInternalError => "external-internal-error",
            ErrorKind::UnknownExternalError => "unknown-external-error",
            ErrorKind::SyncConflict => "sync-conflict",
            ErrorKind::MissingOwnerHeader => "missing-owner-header",
            ErrorKind::UnexpectedError => "unexpected-error",
        }
    }

    /// Client-facing error code (`errorCode` in the response body).
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST_FETCH_SUBSCRIPTIONS",
            ErrorKind::Forbidden => "FORBIDDEN_ACCESS_SUBSCRIPTIONS",
            ErrorKind::NotFound => "CUSTOMER_NOT_FOUND_IN_EXTERNAL_SERVICE",
            ErrorKind::TemporarilyUnavailable => "SUBSCRIPTIONS_TEMPORARILY_UNAVAILABLE",
            ErrorKind::ExternalInternalError => "EXTERNAL_SERVICE_INTERNAL_ERROR",
            ErrorKind::UnknownExternalError => "UNKNOWN_EXTERNAL_SERVICE_ERROR",
            ErrorKind::SyncConflict => "SUBSCRIPTION_SYNC_CONFLICT",
            ErrorKind::MissingOwnerHeader => "MISSING_AUTH_USER_ID_HEADER",
            ErrorKind::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor failures
// ---------------------------------------------------------------------------

/// Failure of one vendor call, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VendorFailure {
    /// Vendor answered with a non-success status.
    #[error("vendor_http_{status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: String,
    },
    /// No usable response: connect error, reset, client-side timeout.
    #[error("vendor_transport: {0}")]
    Transport(String),
    /// Success status, but the body could not be decoded.
    #[error("vendor_decode: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Context + domain error
// ---------------------------------------------------------------------------

/// Parameters available to message templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    params: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self::default().with(PARAM_CUSTOMER_ID, customer_id)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.params.get(PARAM_CUSTOMER_ID).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

/// A classified error, ready to be rendered for a client.
///
/// `detail` is internal: logged server-side, never put in a response body.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (http {http_status}): {detail}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub http_status: u16,
    pub log_level: LogLevel,
    pub params: BTreeMap<String, String>,
    pub detail: String,
}

impl DomainError {
    pub fn new(
        kind: ErrorKind,
        http_status: u16,
        log_level: LogLevel,
        ctx: &ErrorContext,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            http_status,
            log_level,
            params: ctx.params().clone(),
            detail: detail.into(),
        }
    }

    /// Uniqueness violation or serialization failure while committing a cycle.
    pub fn sync_conflict(ctx: &ErrorContext, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyncConflict, 409, LogLevel::Warn, ctx, detail)
    }

    pub fn missing_owner_header() -> Self {
        Self::new(
            ErrorKind::MissingOwnerHeader,
            400,
            LogLevel::Warn,
            &ErrorContext::default(),
            "owner header absent or blank",
        )
    }

    pub fn unexpected(ctx: &ErrorContext, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedError, 500, LogLevel::Error, ctx, detail)
    }

    /// Emit through `tracing` at this error's level.
    pub fn log(&self, error_id: &str) {
        let customer_id = self.params.get(PARAM_CUSTOMER_ID).map(String::as_str).unwrap_or("-");
        match self.log_level {
            LogLevel::Error => tracing::error!(
                error_id,
                kind = self.kind.as_str(),
                http_status = self.http_status,
                customer_id,
                detail = %self.detail,
                "request failed"
            ),
            LogLevel::Warn => tracing::warn!(
                error_id,
                kind = self.kind.as_str(),
                http_status = self.http_status,
                customer_id,
                detail = %self.detail,
                "request failed"
            ),
            LogLevel::Info => tracing::info!(
                error_id,
                kind = self.kind.as_str(),
                http_status = self.http_status,
                customer_id,
                detail = %self.detail,
                "request failed"
            ),
        }
    }
}
