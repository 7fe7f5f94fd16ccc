//! SQLite implementation of IEventStorage
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                   |
//! |-----------------|----------|--------------------------------------------|
//! | EventToken      | INTEGER  | `events.seq` (autoincrement, never reused) |
//! | ChannelName     | TEXT     | `.as_str()` / `ChannelName::new()`         |
//! | EventId         | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | DateTime<Utc>   | TEXT     | RFC 3339 with full sub-second precision    |
//! | Priority        | INTEGER  | `Priority::rank()` / `Priority::from_rank` |
//! | payload         | TEXT     | serde_json serialization                   |

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use avalanche_core::config::StorageConfig;
use avalanche_core::domain::{
    ChannelName, Event, EventId, EventToken, Priority, StorageError, StoredEvent,
};
use avalanche_core::ports::IEventStorage;

use crate::query_failed;

/// SQLite bound on host parameters per statement is 999 on older builds
const PURGE_CHUNK: usize = 500;

/// Capacity ceilings enforced on every append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub max_events_per_channel: u64,
    pub max_events_total: u64,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StorageLimits {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_events_per_channel: config.max_events_per_channel,
            max_events_total: config.max_events_total,
        }
    }
}

/// Durable event queue backed by the `events` table
///
/// Each append runs in its own transaction together with any eviction it
/// causes, so the caps hold after every committed write.
#[derive(Clone)]
pub struct SqliteEventStorage {
    pool: SqlitePool,
    limits: StorageLimits,
    evicted: Arc<AtomicU64>,
}

impl SqliteEventStorage {
    pub fn new(pool: SqlitePool, limits: StorageLimits) -> Self {
        Self {
            pool,
            limits,
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn limits(&self) -> StorageLimits {
        self.limits
    }

    /// Deletes `count` victims, lowest priority first then oldest
    ///
    /// With `channel = None` victims are chosen across all channels.
    async fn evict(
        tx: &mut Transaction<'_, Sqlite>,
        channel: Option<&ChannelName>,
        count: u64,
    ) -> Result<u64, StorageError> {
        let result = match channel {
            Some(channel) => {
                sqlx::query(
                    "DELETE FROM events WHERE seq IN \
                     (SELECT seq FROM events WHERE channel = ? \
                      ORDER BY priority ASC, seq ASC LIMIT ?)",
                )
                .bind(channel.as_str())
                .bind(count as i64)
                .execute(&mut **tx)
                .await
            }
            None => {
                sqlx::query(
                    "DELETE FROM events WHERE seq IN \
                     (SELECT seq FROM events ORDER BY priority ASC, seq ASC LIMIT ?)",
                )
                .bind(count as i64)
                .execute(&mut **tx)
                .await
            }
        }
        .map_err(query_failed)?;

        Ok(result.rows_affected())
    }

    /// Brings the channel and the whole queue back under their caps
    async fn enforce_limits(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        channel: &ChannelName,
    ) -> Result<u64, StorageError> {
        let mut evicted = 0;

        let in_channel: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE channel = ?")
            .bind(channel.as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(query_failed)?;
        let overflow = (in_channel as u64).saturating_sub(self.limits.max_events_per_channel);
        if overflow > 0 {
            evicted += Self::evict(tx, Some(channel), overflow).await?;
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&mut **tx)
            .await
            .map_err(query_failed)?;
        let overflow = (total as u64).saturating_sub(self.limits.max_events_total);
        if overflow > 0 {
            evicted += Self::evict(tx, None, overflow).await?;
        }

        Ok(evicted)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupted(format!("Bad timestamp '{s}': {e}")))
}

fn stored_event_from_row(row: &SqliteRow) -> Result<StoredEvent, StorageError> {
    let seq: i64 = row.get("seq");
    let channel: String = row.get("channel");
    let event_id: String = row.get("event_id");
    let timestamp: String = row.get("timestamp");
    let priority: i64 = row.get("priority");
    let payload: String = row.get("payload");

    let channel = ChannelName::new(channel)
        .map_err(|e| StorageError::Corrupted(format!("Event #{seq}: {e}")))?;
    let id = EventId::from_str(&event_id)
        .map_err(|e| StorageError::Corrupted(format!("Event #{seq}: {e}")))?;
    let priority = Priority::from_rank(priority)
        .map_err(|e| StorageError::Corrupted(format!("Event #{seq}: {e}")))?;
    let payload: serde_json::Value = serde_json::from_str(&payload)
        .map_err(|e| StorageError::Corrupted(format!("Event #{seq} payload: {e}")))?;

    Ok(StoredEvent::new(
        EventToken::new(seq),
        Event::from_parts(id, channel, parse_datetime(&timestamp)?, payload, priority),
    ))
}

// ============================================================================
// IEventStorage implementation
// ============================================================================

#[async_trait::async_trait]
impl IEventStorage for SqliteEventStorage {
    async fn append(
        &self,
        channel: &ChannelName,
        event: &Event,
    ) -> Result<EventToken, StorageError> {
        if event.channel() != channel {
            return Err(StorageError::QueryFailed(format!(
                "Event {} belongs to channel {}, not {}",
                event.id(),
                event.channel(),
                channel
            )));
        }

        let payload = serde_json::to_string(event.payload())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        let result = sqlx::query(
            "INSERT INTO events (channel, event_id, timestamp, priority, payload) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(channel.as_str())
        .bind(event.id().to_string())
        .bind(event.timestamp().to_rfc3339())
        .bind(event.priority().rank())
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;
        let token = EventToken::new(result.last_insert_rowid());

        let evicted = self.enforce_limits(&mut tx, channel).await?;

        tx.commit().await.map_err(query_failed)?;

        if evicted > 0 {
            self.evicted.fetch_add(evicted, Ordering::Relaxed);
            tracing::warn!(
                channel = %channel,
                evicted,
                "Storage capacity reached, evicted lowest-priority events"
            );
        }
        tracing::trace!(channel = %channel, token = %token, "Appended event");
        Ok(token)
    }

    async fn load_pending(
        &self,
        channel: &ChannelName,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT seq, channel, event_id, timestamp, priority, payload FROM events \
             WHERE channel = ? ORDER BY seq ASC LIMIT ?",
        )
        .bind(channel.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(stored_event_from_row).collect()
    }

    async fn mark_purged(&self, tokens: &[EventToken]) -> Result<u64, StorageError> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        let mut removed = 0;
        for chunk in tokens.chunks(PURGE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM events WHERE seq IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for token in chunk {
                query = query.bind(token.value());
            }
            removed += query
                .execute(&mut *tx)
                .await
                .map_err(query_failed)?
                .rows_affected();
        }
        tx.commit().await.map_err(query_failed)?;

        tracing::trace!(requested = tokens.len(), removed, "Purged events");
        Ok(removed)
    }

    async fn count(&self, channel: &ChannelName) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE channel = ?")
            .bind(channel.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(count as u64)
    }

    async fn oldest_timestamp(
        &self,
        channel: &ChannelName,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let ts: Option<String> = sqlx::query_scalar(
            "SELECT timestamp FROM events WHERE channel = ? ORDER BY seq ASC LIMIT 1",
        )
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        ts.as_deref().map(parse_datetime).transpose()
    }

    async fn channels(&self) -> Result<Vec<ChannelName>, StorageError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT channel FROM events ORDER BY channel")
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed)?;

        names
            .into_iter()
            .map(|n| ChannelName::new(n).map_err(|e| StorageError::Corrupted(e.to_string())))
            .collect()
    }

    async fn total_count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(count as u64)
    }

    fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
