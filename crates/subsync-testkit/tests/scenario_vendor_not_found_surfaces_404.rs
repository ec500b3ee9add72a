//! Scenario: the vendor answers 404 for `U1`; full-sync surfaces the
//! not-found kind with HTTP 404 and the owner id in the rendered message.

use std::sync::Arc;

use subsync_errors::{ClassifierTable, ErrorKind, ErrorResponse, LogLevel, MessageCatalog};
use subsync_runtime::{ServiceSettings, SubscriptionService};
use subsync_testkit::{FakeVendor, FaultPlan};

#[tokio::test]
async fn full_sync_404_is_customer_not_found() {
    let store = subsync_db::MemStore::new();
    let vendor = Arc::new(FakeVendor::new());
    vendor.set_plan(FaultPlan::http_status(404, "Not Found"));

    let svc = SubscriptionService::new(
        Arc::new(store.clone()),
        vendor,
        Arc::new(ClassifierTable::default()),
        ServiceSettings::default(),
    );

    let err = svc.full_sync("U1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.http_status, 404);
    assert_eq!(err.log_level, LogLevel::Warn);

    let body = ErrorResponse::from_domain(&err, &MessageCatalog::default());
    assert_eq!(body.error_code, "CUSTOMER_NOT_FOUND_IN_EXTERNAL_SERVICE");
    assert_eq!(body.error_id.len(), 32);
    let msg = &body.messages["en"];
    assert!(msg.contains("U1"), "message must name the owner: {msg}");
    assert!(store.is_empty());
}

#[tokio::test]
async fn unregistered_status_is_unknown_external_error() {
    let vendor = Arc::new(FakeVendor::new());
    vendor.set_plan(FaultPlan::http_status(418, "teapot"));
    let svc = SubscriptionService::new(
        Arc::new(subsync_db::MemStore::new()),
        vendor,
        Arc::new(ClassifierTable::default()),
        ServiceSettings::default(),
    );
    let err = svc.fetch_vendor("U1").await.unwrap_err();
    assert_eq!((err.kind, err.http_status), (ErrorKind::UnknownExternalError, 502));
}
