//! Axum router and all HTTP handlers for subsync-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every subscription route is scoped to the owner named
//! in the `AUTH-USER-ID` header.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use subsync_errors::{DomainError, ErrorResponse};
use subsync_vendor::OWNER_HEADER;

use crate::{
    api_types::{
        HealthResponse, SubscriptionListResponse, SubscriptionView, SyncResponse,
        VendorFetchResponse,
    },
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/subscriptions", get(list_subscriptions))
        .route("/v1/subscriptions/sync", post(sync_subscriptions))
        .route("/v1/subscriptions/vendor", get(vendor_subscriptions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn owner_from_headers(headers: &HeaderMap) -> Result<String, DomainError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(DomainError::missing_owner_header)
}

/// Log under a fresh error id and render the structured body.
fn error_response(st: &AppState, err: DomainError) -> Response {
    let body = ErrorResponse::from_domain(&err, &st.catalog);
    err.log(&body.error_id);
    let status = StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            store: st.store_backend.to_string(),
            vendor: st.vendor_source.to_string(),
            refreshes_in_flight: st.service.pool().in_flight(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/subscriptions
// ---------------------------------------------------------------------------

/// Local snapshot; schedules a background refresh and never waits on it.
pub(crate) async fn list_subscriptions(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let owner_id = match owner_from_headers(&headers) {
        Ok(o) => o,
        Err(e) => return error_response(&st, e),
    };
    match st.service.read_and_refresh(&owner_id).await {
        Ok(subs) => {
            let subscriptions: Vec<SubscriptionView> = subs.iter().map(SubscriptionView::from).collect();
            (
                StatusCode::OK,
                Json(SubscriptionListResponse {
                    owner_id,
                    count: subscriptions.len(),
                    subscriptions,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&st, e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/subscriptions/sync
// ---------------------------------------------------------------------------

pub(crate) async fn sync_subscriptions(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let owner_id = match owner_from_headers(&headers) {
        Ok(o) => o,
        Err(e) => return error_response(&st, e),
    };
    match st.service.full_sync(&owner_id).await {
        Ok(res) => (
            StatusCode::OK,
            Json(SyncResponse {
                report: res.report,
                subscriptions: res.subscriptions.iter().map(SubscriptionView::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&st, e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/subscriptions/vendor
// ---------------------------------------------------------------------------

pub(crate) async fn vendor_subscriptions(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let owner_id = match owner_from_headers(&headers) {
        Ok(o) => o,
        Err(e) => return error_response(&st, e),
    };
    match st.service.fetch_vendor(&owner_id).await {
        Ok(batch) => (
            StatusCode::OK,
            Json(VendorFetchResponse::new(&owner_id, st.vendor_source, &batch)),
        )
            .into_response(),
        Err(e) => error_response(&st, e),
    }
}
