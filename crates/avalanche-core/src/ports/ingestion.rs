//! Ingestion port (driven/secondary port)

use crate::domain::{Ack, Batch, SendError};

/// Port trait for transmitting batches to the backend
///
/// Implementations must tolerate concurrent calls for different channels
/// and must never reorder the events of a batch. Every call is bounded by a
/// deadline; a timeout maps to [`SendError::Retryable`].
#[async_trait::async_trait]
pub trait IIngestion: Send + Sync {
    /// Sends `batch` and returns the backend's acknowledgement
    async fn send(&self, batch: &Batch) -> Result<Ack, SendError>;
}
