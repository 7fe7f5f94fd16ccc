//! In-memory implementation of IEventStorage
//!
//! Same ordering, purge and eviction semantics as [`SqliteEventStorage`],
//! without durability. Used for ephemeral sessions and pipeline tests.
//!
//! [`SqliteEventStorage`]: crate::SqliteEventStorage

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use avalanche_core::domain::{ChannelName, Event, EventToken, StorageError, StoredEvent};
use avalanche_core::ports::IEventStorage;

use crate::events::StorageLimits;

#[derive(Default)]
struct Queue {
    next_seq: i64,
    events: BTreeMap<i64, Event>,
}

impl Queue {
    /// Removes `count` victims, lowest priority first then oldest
    fn evict(&mut self, channel: Option<&ChannelName>, count: u64) -> u64 {
        let mut candidates: Vec<(i64, i64)> = self
            .events
            .iter()
            .filter(|(_, e)| channel.map_or(true, |c| e.channel() == c))
            .map(|(seq, e)| (e.priority().rank(), *seq))
            .collect();
        candidates.sort_unstable();

        let mut removed = 0;
        for (_, seq) in candidates.into_iter().take(count as usize) {
            if self.events.remove(&seq).is_some() {
                removed += 1;
            }
        }
        removed
    }

    fn count(&self, channel: &ChannelName) -> u64 {
        self.events
            .values()
            .filter(|e| e.channel() == channel)
            .count() as u64
    }
}

/// Non-durable event queue
pub struct MemoryEventStorage {
    limits: StorageLimits,
    queue: Mutex<Queue>,
    appends: AtomicU64,
    evicted: AtomicU64,
}

impl MemoryEventStorage {
    pub fn new(limits: StorageLimits) -> Self {
        Self {
            limits,
            queue: Mutex::new(Queue {
                next_seq: 1,
                events: BTreeMap::new(),
            }),
            appends: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Number of successful `append` calls since creation
    pub fn append_count(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Queue>, StorageError> {
        self.queue
            .lock()
            .map_err(|_| StorageError::Corrupted("memory queue lock poisoned".to_string()))
    }
}

impl Default for MemoryEventStorage {
    fn default() -> Self {
        Self::new(StorageLimits::default())
    }
}

#[async_trait::async_trait]
impl IEventStorage for MemoryEventStorage {
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

        let (token, evicted) = {
            let mut queue = self.lock()?;
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.events.insert(seq, event.clone());

            let mut evicted = 0;
            let overflow = queue
                .count(channel)
                .saturating_sub(self.limits.max_events_per_channel);
            if overflow > 0 {
                evicted += queue.evict(Some(channel), overflow);
            }
            let overflow =
                (queue.events.len() as u64).saturating_sub(self.limits.max_events_total);
            if overflow > 0 {
                evicted += queue.evict(None, overflow);
            }
            (EventToken::new(seq), evicted)
        };

        self.appends.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.evicted.fetch_add(evicted, Ordering::Relaxed);
            tracing::warn!(
                channel = %channel,
                evicted,
                "Storage capacity reached, evicted lowest-priority events"
            );
        }
        Ok(token)
    }

    async fn load_pending(
        &self,
        channel: &ChannelName,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, StorageError> {
        let queue = self.lock()?;
        Ok(queue
            .events
            .iter()
            .filter(|(_, e)| e.channel() == channel)
            .take(limit)
            .map(|(seq, e)| StoredEvent::new(EventToken::new(*seq), e.clone()))
            .collect())
    }

    async fn mark_purged(&self, tokens: &[EventToken]) -> Result<u64, StorageError> {
        let mut queue = self.lock()?;
        Ok(tokens
            .iter()
            .filter(|t| queue.events.remove(&t.value()).is_some())
            .count() as u64)
    }

    async fn count(&self, channel: &ChannelName) -> Result<u64, StorageError> {
        Ok(self.lock()?.count(channel))
    }

    async fn oldest_timestamp(
        &self,
        channel: &ChannelName,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let queue = self.lock()?;
        Ok(queue
            .events
            .values()
            .find(|e| e.channel() == channel)
            .map(|e| e.timestamp()))
    }

    async fn channels(&self) -> Result<Vec<ChannelName>, StorageError> {
        let queue = self.lock()?;
        let mut names: Vec<ChannelName> =
            queue.events.values().map(|e| e.channel().clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn total_count(&self) -> Result<u64, StorageError> {
        Ok(self.lock()?.events.len() as u64)
    }

    fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}
