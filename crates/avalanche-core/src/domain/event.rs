//! Event domain entity
//!
//! An [`Event`] is an immutable telemetry record pushed by a feature module.
//! Once storage accepts it, it travels as a [`StoredEvent`] carrying the
//! storage token used for purging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ChannelName, EventId, EventToken};

/// Priority tier of an event
///
/// Under storage pressure the lowest tier is evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Integer rank used by storage backends (0 = lowest)
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Inverse of [`Priority::rank`]
    pub fn from_rank(rank: i64) -> Result<Self, DomainError> {
        match rank {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Critical),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown priority rank: {other}"
            ))),
        }
    }

    /// Returns the name of this priority
    pub fn name(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown priority: {other}"
            ))),
        }
    }
}

/// A telemetry event, immutable once constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    channel: ChannelName,
    timestamp: DateTime<Utc>,
    payload: serde_json::Value,
    priority: Priority,
}

impl Event {
    /// Creates a new event stamped with the current time
    pub fn new(channel: ChannelName, payload: serde_json::Value, priority: Priority) -> Self {
        Self {
            id: EventId::new(),
            channel,
            timestamp: Utc::now(),
            payload,
            priority,
        }
    }

    /// Rebuilds an event from persisted parts
    pub fn from_parts(
        id: EventId,
        channel: ChannelName,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        Self {
            id,
            channel,
            timestamp,
            payload,
            priority,
        }
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

/// An event together with the token storage assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub token: EventToken,
    pub event: Event,
}

impl StoredEvent {
    pub fn new(token: EventToken, event: Event) -> Self {
        Self { token, event }
    }
}
