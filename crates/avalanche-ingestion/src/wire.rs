//! Wire format of the ingestion endpoint
//!
//! Request: `POST {base}/logs` with a JSON [`LogPayload`]. A 2xx response
//! carrying [`AckBody`] acknowledges the batch; error responses may carry an
//! [`ErrorBody`] that overrides the status-based classification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use avalanche_core::domain::{Batch, BatchId, EventId, InstallId, Priority, SendError};

// ============================================================================
// Request body
// ============================================================================

/// Serialized batch
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload<'a> {
    pub batch_id: BatchId,
    pub channel: &'a str,
    pub install_id: InstallId,
    pub sent_at: DateTime<Utc>,
    pub events: Vec<WireEvent<'a>>,
}

/// One event inside a [`LogPayload`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent<'a> {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub payload: &'a serde_json::Value,
}

impl<'a> LogPayload<'a> {
    /// Builds the payload for `batch`, keeping the batch's event order
    pub fn from_batch(batch: &'a Batch, install_id: InstallId) -> Self {
        Self {
            batch_id: *batch.id(),
            channel: batch.channel().as_str(),
            install_id,
            sent_at: Utc::now(),
            events: batch
                .events()
                .iter()
                .map(|stored| WireEvent {
                    id: *stored.event.id(),
                    timestamp: stored.event.timestamp(),
                    priority: stored.event.priority(),
                    payload: stored.event.payload(),
                })
                .collect(),
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

/// Positive acknowledgement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckBody {
    pub batch_id: BatchId,
}

/// Structured error returned by the backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub retryable: Option<bool>,
    pub disable: Option<bool>,
}

impl ErrorBody {
    fn describe(&self, status: StatusCode) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("HTTP {status}: {code}: {message}"),
            (Some(code), None) => format!("HTTP {status}: {code}"),
            (None, Some(message)) => format!("HTTP {status}: {message}"),
            (None, None) => format!("HTTP {status}"),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Whether a status is transient when the body does not say otherwise
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Maps a non-2xx response to the channel-facing classification
///
/// Precedence: `410 Gone` or `disable: true` pauses the channel; an explicit
/// `retryable` flag wins over the status; otherwise 408, 429 and 5xx are
/// retryable and every other status is fatal.
pub fn classify(status: StatusCode, body: &str, retry_after: Option<Duration>) -> SendError {
    let error: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let reason = error.describe(status);

    if status == StatusCode::GONE || error.disable == Some(true) {
        return SendError::Disabled { reason };
    }

    let retryable = error
        .retryable
        .unwrap_or_else(|| is_transient_status(status));

    if retryable {
        SendError::Retryable {
            reason,
            retry_after,
        }
    } else {
        SendError::Fatal {
            status: Some(status.as_u16()),
            reason,
        }
    }
}

/// Maps a transport failure (no response) to a classification
pub fn classify_transport(error: &reqwest::Error) -> SendError {
    if error.is_builder() {
        return SendError::fatal(format!("Malformed request: {error}"));
    }
    SendError::retryable(format!("Transport error: {error}"))
}
