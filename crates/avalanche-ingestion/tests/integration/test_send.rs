//! Successful sends and acknowledgement handling

use std::sync::Arc;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use avalanche_core::domain::{InstallId, SendErrorKind};
use avalanche_core::ports::IIngestion;
use avalanche_ingestion::OutboundBudget;

use crate::common::{self, EchoAck};

#[tokio::test]
async fn test_send_posts_batch_with_headers() {
    let server = MockServer::start().await;
    let install_id = InstallId::generate();

    Mock::given(method("POST"))
        .and(path("/logs"))
        .and(header("App-Secret", common::SECRET))
        .and(header("Install-ID", install_id.to_string().as_str()))
        .and(header("Content-Type", "application/json"))
        .respond_with(EchoAck)
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client(&server.uri(), install_id);
    let batch = common::batch("analytics", 3);
    let ack = client.send(&batch).await.expect("send failed");
    assert!(ack.acknowledges(&batch));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["channel"], "analytics");
    assert_eq!(body["installId"], install_id.to_string());
    let ns: Vec<i64> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["payload"]["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(EchoAck)
        .mount(&server)
        .await;

    let client = common::client(&format!("{}/", server.uri()), InstallId::generate());
    assert!(client.send(&common::batch("analytics", 1)).await.is_ok());
}

#[tokio::test]
async fn test_mismatched_ack_is_not_an_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "batchId": InstallId::generate().to_string()
        })))
        .mount(&server)
        .await;

    let client = common::client(&server.uri(), InstallId::generate());
    let err = client
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SendErrorKind::Retryable);
}

#[tokio::test]
async fn test_empty_success_body_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = common::client(&server.uri(), InstallId::generate());
    let err = client
        .send(&common::batch("analytics", 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SendErrorKind::Retryable);
}

#[tokio::test]
async fn test_concurrent_sends_for_different_channels() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs"))
        .respond_with(EchoAck)
        .expect(2)
        .mount(&server)
        .await;

    let client = Arc::new(
        common::client(&server.uri(), InstallId::generate())
            .with_budget(Arc::new(OutboundBudget::new(100.0, 10, 1_000_000, 1_000_000))),
    );
    let analytics = common::batch("analytics", 2);
    let crashes = common::batch("crashes", 2);

    let (a, c) = tokio::join!(client.send(&analytics), client.send(&crashes));
    assert!(a.unwrap().acknowledges(&analytics));
    assert!(c.unwrap().acknowledges(&crashes));
}
