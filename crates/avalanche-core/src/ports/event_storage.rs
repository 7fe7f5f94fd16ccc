//! Event storage port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses [`StorageError`] rather than `anyhow` so the channel layer can log
//!   and degrade without inspecting adapter-specific errors.
//! - Tokens are opaque to callers; they only flow back into
//!   [`IEventStorage::mark_purged`].

use chrono::{DateTime, Utc};

use crate::domain::{ChannelName, Event, EventToken, StorageError, StoredEvent};

/// Port trait for the persistent event queue
///
/// ## Implementation Notes
///
/// - `append` must be durable before it returns.
/// - Capacity overflow is resolved by eviction inside `append`, never by an
///   error: lowest priority first, then oldest.
/// - `mark_purged` must be idempotent.
#[async_trait::async_trait]
pub trait IEventStorage: Send + Sync {
    /// Appends `event` to the queue of `channel` and returns its token
    async fn append(&self, channel: &ChannelName, event: &Event)
        -> Result<EventToken, StorageError>;

    /// Loads up to `limit` pending events of `channel` in insertion order
    async fn load_pending(
        &self,
        channel: &ChannelName,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StorageError>;

    /// Removes the given events; returns how many rows were actually removed
    async fn mark_purged(&self, tokens: &[EventToken]) -> Result<u64, StorageError>;

    /// Number of pending events of `channel`
    async fn count(&self, channel: &ChannelName) -> Result<u64, StorageError>;

    /// Timestamp of the oldest pending event of `channel`
    async fn oldest_timestamp(
        &self,
        channel: &ChannelName,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Names of channels that have pending events
    async fn channels(&self) -> Result<Vec<ChannelName>, StorageError>;

    /// Number of pending events across all channels
    async fn total_count(&self) -> Result<u64, StorageError>;

    /// Number of events dropped by capacity eviction since this adapter was created
    fn evicted_total(&self) -> u64;
}
