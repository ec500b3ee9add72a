use std::time::Duration;

use httpmock::prelude::*;
use subsync_errors::VendorFailure;
use subsync_reconcile::MICROS_SCALE;
use subsync_vendor::{HttpVendorGateway, VendorGateway, OWNER_HEADER, SUBSCRIPTIONS_PATH};
use uuid::Uuid;

const A: &str = "6f1c2f7e-6a4b-4a8e-9d55-0b2b7f3f7a01";

fn gateway(server: &MockServer, timeout_ms: u64) -> HttpVendorGateway {
    HttpVendorGateway::new(
        server.base_url(),
        Duration::from_millis(timeout_ms),
        Some("test-key".to_string()),
    )
}

#[tokio::test]
async fn fetch_sends_owner_and_ids_and_decodes_batch() {
    let server = MockServer::start_async().await;
    let body = format!(
        r#"{{"subscriptions":[{{"publicId":"{A}","vendorStatus":"ACTIVE","vendorBalance":"10.00","brand":"Acme"}}],"total":1}}"#
    );
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(SUBSCRIPTIONS_PATH)
                .query_param("customerId", "U1")
                .query_param("publicId", A)
                .header(OWNER_HEADER.to_ascii_lowercase(), "U1")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        })
        .await;

    let id = Uuid::parse_str(A).unwrap();
    let batch = gateway(&server, 1_000).fetch("U1", &[id]).await.unwrap();

    mock.assert_async().await;
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].public_id, id);
    assert_eq!(batch.records[0].vendor_balance_micros, Some(10 * MICROS_SCALE));
    assert_eq!(batch.records[0].brand.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn non_success_status_becomes_http_failure_with_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(SUBSCRIPTIONS_PATH);
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"message":"customer U1 unknown"}"#);
        })
        .await;

    let err = gateway(&server, 1_000).fetch("U1", &[]).await.unwrap_err();
    match err {
        VendorFailure::Http {
            status,
            message,
            body,
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "customer U1 unknown");
            assert!(body.contains("customer U1 unknown"));
        }
        other => panic!("expected http failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_vendor_becomes_transport_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(SUBSCRIPTIONS_PATH);
            then.status(200)
                .delay(Duration::from_millis(500))
                .body(r#"{"subscriptions":[]}"#);
        })
        .await;

    let err = gateway(&server, 50).fetch("U1", &[]).await.unwrap_err();
    assert!(matches!(err, VendorFailure::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn garbage_body_becomes_decode_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(SUBSCRIPTIONS_PATH);
            then.status(200).body("not json at all");
        })
        .await;

    let err = gateway(&server, 1_000).fetch("U1", &[]).await.unwrap_err();
    assert!(matches!(err, VendorFailure::Decode(_)));
}
