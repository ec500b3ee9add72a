use std::collections::BTreeMap;

use crate::{ClassifierError, ErrorKind};

fn default_template(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidRequest => {
            "Invalid request while fetching subscriptions for customer {customerId}"
        }
        ErrorKind::Forbidden => "Access to subscriptions of customer {customerId} is forbidden",
        ErrorKind::NotFound => "Customer {customerId} was not found in the external service",
        ErrorKind::TemporarilyUnavailable => {
            "Subscriptions of customer {customerId} are temporarily unavailable, try again later"
        }
        ErrorKind::ExternalInternalError => {
            "External subscription service failed for customer {customerId}"
        }
        ErrorKind::UnknownExternalError => {
            "Unknown error from the external subscription service for customer {customerId}"
        }
        ErrorKind::SyncConflict => {
            "Subscriptions of customer {customerId} were modified concurrently, retry the sync"
        }
        ErrorKind::MissingOwnerHeader => "Header AUTH-USER-ID is required",
        ErrorKind::UnexpectedError => "An unexpected error occurred",
    }
}

/// Message template per kind. Placeholders are `{name}`; a placeholder with
/// no matching parameter is left in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCatalog {
    templates: BTreeMap<ErrorKind, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let templates = ErrorKind::ALL
            .into_iter()
            .map(|k| (k, default_template(k).to_string()))
            .collect();
        Self { templates }
    }
}

impl MessageCatalog {
    /// Defaults with per-kind overrides keyed by kind string (`not-found`, ...).
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ClassifierError> {
        let mut cat = Self::default();
        for (key, template) in overrides {
            let kind = ErrorKind::parse(key)
                .ok_or_else(|| ClassifierError::UnknownMessageKey(key.clone()))?;
            cat.templates.insert(kind, template.clone());
        }
        Ok(cat)
    }

    pub fn template(&self, kind: ErrorKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind))
    }

    /// Single pass over the template; substituted values are never rescanned.
    pub fn render(&self, kind: ErrorKind, params: &BTreeMap<String, String>) -> String {
        let mut rest = self.template(kind);
        let mut out = String::with_capacity(rest.len());
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            match tail.find('}') {
                Some(close) => {
                    let name = &tail[1..close];
                    match params.get(name) {
                        Some(v) => out.push_str(v),
                        None => out.push_str(&tail[..=close]),
                    }
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
