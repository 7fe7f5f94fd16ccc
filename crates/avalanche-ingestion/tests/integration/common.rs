//! Shared helpers for ingestion integration tests

use std::time::Duration;

use wiremock::{Request, Respond, ResponseTemplate};

use avalanche_core::domain::{
    AppSecret, Batch, ChannelName, Event, EventToken, InstallId, Priority, StoredEvent,
};
use avalanche_ingestion::HttpIngestion;

pub const SECRET: &str = "test-app-secret";

/// Responds 200 with an acknowledgement echoing the request's batch id
pub struct EchoAck;

impl Respond for EchoAck {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "batchId": body["batchId"]
        }))
    }
}

pub fn client(base_url: &str, install_id: InstallId) -> HttpIngestion {
    HttpIngestion::new(
        base_url,
        AppSecret::new(SECRET).unwrap(),
        install_id,
        Duration::from_secs(5),
    )
}

/// Batch of `count` events on `channel`, payloads numbered from 0
pub fn batch(channel: &str, count: i64) -> Batch {
    let channel = ChannelName::new(channel).unwrap();
    let events = (0..count)
        .map(|n| {
            StoredEvent::new(
                EventToken::new(n + 1),
                Event::new(
                    channel.clone(),
                    serde_json::json!({ "n": n }),
                    Priority::Normal,
                ),
            )
        })
        .collect();
    Batch::new(channel, events).unwrap()
}
