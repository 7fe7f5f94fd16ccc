//! Batch domain entity
//!
//! A [`Batch`] is the unit of transmission: an ordered, non-empty run of
//! stored events from a single channel. An [`Ack`] is the backend's
//! positive acknowledgement referencing exactly one batch.

use chrono::{DateTime, Utc};

use super::errors::DomainError;
use super::event::StoredEvent;
use super::newtypes::{BatchId, ChannelName, EventToken};

/// Ordered group of events transmitted together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    id: BatchId,
    channel: ChannelName,
    events: Vec<StoredEvent>,
}

impl Batch {
    /// Creates a batch from events loaded for `channel`
    ///
    /// # Errors
    /// Returns error if `events` is empty, belongs to another channel, or is
    /// not in ascending token order.
    pub fn new(channel: ChannelName, events: Vec<StoredEvent>) -> Result<Self, DomainError> {
        if events.is_empty() {
            return Err(DomainError::ValidationFailed(
                "Batch must contain at least one event".to_string(),
            ));
        }

        if let Some(stray) = events.iter().find(|e| e.event.channel() != &channel) {
            return Err(DomainError::ValidationFailed(format!(
                "Event {} belongs to channel {}, not {}",
                stray.event.id(),
                stray.event.channel(),
                channel
            )));
        }

        if events.windows(2).any(|w| w[0].token >= w[1].token) {
            return Err(DomainError::ValidationFailed(
                "Batch events must be in insertion order".to_string(),
            ));
        }

        Ok(Self {
            id: BatchId::new(),
            channel,
            events,
        })
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Storage tokens of every event, in order
    pub fn tokens(&self) -> Vec<EventToken> {
        self.events.iter().map(|e| e.token).collect()
    }

    /// Timestamp of the oldest event in the batch
    pub fn oldest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.iter().map(|e| e.event.timestamp()).min()
    }
}

/// Positive acknowledgement of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub batch_id: BatchId,
}

impl Ack {
    pub fn new(batch_id: BatchId) -> Self {
        Self { batch_id }
    }

    /// Whether this acknowledgement references `batch`
    pub fn acknowledges(&self, batch: &Batch) -> bool {
        self.batch_id == *batch.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Event, Priority};

    fn stored(seq: i64, channel: &str) -> StoredEvent {
        StoredEvent::new(
            EventToken::new(seq),
            Event::new(
                ChannelName::new(channel).unwrap(),
                serde_json::json!({ "seq": seq }),
                Priority::Normal,
            ),
        )
    }

    #[test]
    fn test_batch_preserves_order_and_tokens() {
        let channel = ChannelName::new("analytics").unwrap();
        let batch = Batch::new(
            channel,
            vec![stored(1, "analytics"), stored(4, "analytics"), stored(9, "analytics")],
        )
        .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.tokens(),
            vec![EventToken::new(1), EventToken::new(4), EventToken::new(9)]
        );
    }

    #[test]
    fn test_empty_batch_rejected() {
        let channel = ChannelName::new("analytics").unwrap();
        assert!(Batch::new(channel, Vec::new()).is_err());
    }

    #[test]
    fn test_foreign_channel_rejected() {
        let channel = ChannelName::new("analytics").unwrap();
        let result = Batch::new(channel, vec![stored(1, "analytics"), stored(2, "crashes")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let channel = ChannelName::new("analytics").unwrap();
        let result = Batch::new(channel, vec![stored(5, "analytics"), stored(2, "analytics")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ack_matches_only_its_batch() {
        let channel = ChannelName::new("analytics").unwrap();
        let a = Batch::new(channel.clone(), vec![stored(1, "analytics")]).unwrap();
        let b = Batch::new(channel, vec![stored(1, "analytics")]).unwrap();

        let ack = Ack::new(*a.id());
        assert!(ack.acknowledges(&a));
        assert!(!ack.acknowledges(&b));
    }
}
