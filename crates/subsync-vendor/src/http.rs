use std::time::Duration;

use serde_json::Value;
use subsync_errors::VendorFailure;
use subsync_reconcile::vendor_adapter::{normalize_json, VendorBatch};
use uuid::Uuid;

use crate::VendorGateway;

pub const SUBSCRIPTIONS_PATH: &str = "/api/external/subscriptions";
/// Header carrying the owner id on the vendor request.
pub const OWNER_HEADER: &str = "AUTH-USER-ID";

/// HTTP vendor gateway.
///
/// API key is resolved by the caller and passed in; never logged.
#[derive(Clone)]
pub struct HttpVendorGateway {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpVendorGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVendorGateway")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpVendorGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
            api_key,
        }
    }

    fn subscriptions_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SUBSCRIPTIONS_PATH)
    }
}

/// Prefer the vendor's own `message` field; fall back to the status reason.
fn failure_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        })
}

#[async_trait::async_trait]
impl VendorGateway for HttpVendorGateway {
    fn source_name(&self) -> &'static str {
        "vendor-http"
    }

    async fn fetch(&self, owner_id: &str, public_ids: &[Uuid]) -> Result<VendorBatch, VendorFailure> {
        let mut query: Vec<(&str, String)> = vec![("customerId", owner_id.to_string())];
        query.extend(public_ids.iter().map(|id| ("publicId", id.to_string())));

        let mut req = self
            .http
            .get(self.subscriptions_url())
            .query(&query)
            .header(OWNER_HEADER, owner_id)
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                VendorFailure::Transport(format!("vendor request timed out after {:?}", self.timeout))
            } else {
                VendorFailure::Transport(format!("vendor request failed: {e}"))
            }
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| VendorFailure::Transport(format!("vendor body read failed: {e}")))?;

        if !status.is_success() {
            tracing::warn!(
                owner_id,
                status = status.as_u16(),
                "vendor returned non-success status"
            );
            return Err(VendorFailure::Http {
                status: status.as_u16(),
                message: failure_message(status, &body),
                body,
            });
        }

        let batch = normalize_json(&body).map_err(|e| VendorFailure::Decode(e.to_string()))?;
        for issue in &batch.issues {
            tracing::warn!(owner_id, %issue, "vendor entry degraded");
        }
        tracing::info!(
            owner_id,
            requested = public_ids.len(),
            received = batch.records.len(),
            "vendor fetch ok"
        );
        Ok(batch)
    }
}
