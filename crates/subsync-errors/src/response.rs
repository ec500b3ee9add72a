use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::{DomainError, LogLevel, MessageCatalog};

/// Locale key used for rendered messages.
pub const DEFAULT_LOCALE: &str = "en";

/// Structured error body returned by the HTTP surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// 32 lowercase hex chars; correlates the body with the server-side log line.
    pub error_id: String,
    pub error_code: String,
    pub level: LogLevel,
    pub messages: BTreeMap<String, String>,
}

impl ErrorResponse {
    pub fn from_domain(err: &DomainError, catalog: &MessageCatalog) -> Self {
        Self::with_id(new_error_id(), err, catalog)
    }

    pub fn with_id(error_id: String, err: &DomainError, catalog: &MessageCatalog) -> Self {
        let mut messages = BTreeMap::new();
        messages.insert(
            DEFAULT_LOCALE.to_string(),
            catalog.render(err.kind, &err.params),
        );
        Self {
            error_id,
            error_code: err.kind.code().to_string(),
            level: err.log_level,
            messages,
        }
    }
}

pub fn new_error_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassifierTable, ErrorContext, VendorFailure};

    #[test]
    fn body_shape_for_not_found() {
        let err = ClassifierTable::default().classify(
            &VendorFailure::Http {
                status: 404,
                message: "Not Found".into(),
                body: "{\"error\":\"no customer\"}".into(),
            },
            &ErrorContext::for_customer("U1"),
        );
        let body = ErrorResponse::from_domain(&err, &MessageCatalog::default());
        assert_eq!(body.error_id.len(), 32);
        assert!(body.error_id.chars().all(|c| c.is_ascii_hexdigit()));

        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["errorCode"], "CUSTOMER_NOT_FOUND_IN_EXTERNAL_SERVICE");
        assert_eq!(v["level"], "WARN");
        assert!(v["messages"]["en"].as_str().unwrap().contains("U1"));
        // internal detail stays out of the body
        assert!(!v.to_string().contains("no customer"));
    }
}
