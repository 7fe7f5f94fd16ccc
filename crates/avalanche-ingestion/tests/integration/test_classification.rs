//! Failure classification of real HTTP exchanges

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use avalanche_core::domain::{AppSecret, InstallId, SendError, SendErrorKind};
use avalanche_core::ports::IIngestion;
use avalanche_ingestion::{HttpIngestion, OutboundBudget};

use crate::common;

async fn send_against(template: ResponseTemplate) -> SendError {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(template)
        .mount(&server)
        .await;

    common::client(&server.uri(), InstallId::generate())
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let err = send_against(ResponseTemplate::new(500)).await;
    assert_eq!(err.kind(), SendErrorKind::Retryable);
}

#[tokio::test]
async fn test_bad_request_is_fatal() {
    let err = send_against(ResponseTemplate::new(400).set_body_json(serde_json::json!({
        "code": "invalid_payload",
        "message": "priority missing"
    })))
    .await;
    match err {
        SendError::Fatal { status, reason } => {
            assert_eq!(status, Some(400));
            assert!(reason.contains("invalid_payload"));
        }
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gone_disables_channel() {
    let err = send_against(ResponseTemplate::new(410)).await;
    assert_eq!(err.kind(), SendErrorKind::Disabled);
}

#[tokio::test]
async fn test_disable_flag_in_body() {
    let err = send_against(ResponseTemplate::new(403).set_body_json(serde_json::json!({
        "code": "app_suspended",
        "disable": true
    })))
    .await;
    assert_eq!(err.kind(), SendErrorKind::Disabled);
}

#[tokio::test]
async fn test_too_many_requests_carries_retry_after_and_throttles() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let budget = Arc::new(OutboundBudget::new(10.0, 20, 1_000_000, 1_000_000));
    let client =
        common::client(&server.uri(), InstallId::generate()).with_budget(Arc::clone(&budget));
    let err = client
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SendErrorKind::Retryable);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    assert_eq!(budget.requests().effective_capacity(), 10);
}

#[tokio::test]
async fn test_timeout_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = HttpIngestion::new(
        server.uri(),
        AppSecret::new(common::SECRET).unwrap(),
        InstallId::generate(),
        Duration::from_millis(100),
    );
    let err = client
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SendErrorKind::Retryable);
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    // Nothing listens on the discard port
    let client = common::client("http://127.0.0.1:9", InstallId::generate());
    let err = client
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SendErrorKind::Retryable);
}
