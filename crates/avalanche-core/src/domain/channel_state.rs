//! Channel delivery state machine
//!
//! Each channel moves through:
//!
//! ```text
//! Idle ──▶ Accumulating ──▶ Flushing ──┬─ SendSucceeded ──▶ Idle
//!                ▲                     ├─ Retryable ──▶ Backoff ──▶ Accumulating
//!                │                     ├─ Fatal / RetriesExhausted ──▶ Accumulating
//!                │                     └─ Disabled ──▶ Paused
//!                └──────────── Resumed ◀──────────────────┘
//! ```
//!
//! The machine is advanced by discrete [`ChannelTransition`] events; the
//! deadline and retry counter live next to it in the channel worker.

use serde::{Deserialize, Serialize};

use super::errors::{DomainError, SendErrorKind};

/// State of a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Nothing pending
    Idle,
    /// Events pending, waiting for a flush trigger
    Accumulating,
    /// One batch is in flight
    Flushing,
    /// Last send failed with a retryable error; waiting for the deadline
    Backoff,
    /// The backend asked this channel to stop; needs an external re-enable
    Paused,
}

/// Discrete events that advance a [`ChannelState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTransition {
    /// Storage holds at least one pending event for the channel
    EventsPending,
    /// No pending events remain
    Drained,
    /// A batch was handed to the sender
    FlushStarted,
    /// The in-flight batch was acknowledged
    SendSucceeded,
    /// The in-flight batch failed with the given classification
    SendFailed(SendErrorKind),
    /// The retry budget is spent; events stay stored
    RetriesExhausted,
    /// The backoff deadline passed
    BackoffElapsed,
    /// In-flight send or backoff was cancelled (global disable)
    Interrupted,
    /// A paused channel was re-enabled externally
    Resumed,
}

impl ChannelState {
    /// Returns the name of this state
    pub fn name(&self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Accumulating => "accumulating",
            ChannelState::Flushing => "flushing",
            ChannelState::Backoff => "backoff",
            ChannelState::Paused => "paused",
        }
    }

    /// Returns true while a batch is outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ChannelState::Flushing)
    }

    /// Returns true if a flush may start from this state
    pub fn can_flush(&self) -> bool {
        matches!(self, ChannelState::Accumulating)
    }

    /// Computes the state reached by applying `transition`
    ///
    /// Valid transitions:
    /// - Idle, Accumulating -> Accumulating (EventsPending), Idle (Drained)
    /// - Accumulating -> Flushing (FlushStarted)
    /// - Flushing -> Idle (SendSucceeded), Backoff (Retryable), Accumulating
    ///   (Fatal, RetriesExhausted, Interrupted), Paused (Disabled)
    /// - Backoff -> Accumulating (BackoffElapsed, Interrupted)
    /// - Paused -> Accumulating (Resumed)
    /// - Flushing, Backoff, Paused absorb EventsPending unchanged
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn apply(self, transition: ChannelTransition) -> Result<ChannelState, DomainError> {
        use ChannelState::*;
        use ChannelTransition::*;

        let next = match (self, transition) {
            (Idle | Accumulating, EventsPending) => Accumulating,
            (Idle | Accumulating, Drained) => Idle,
            (Flushing | Backoff | Paused, EventsPending) => self,

            (Accumulating, FlushStarted) => Flushing,

            (Flushing, SendSucceeded) => Idle,
            (Flushing, SendFailed(SendErrorKind::Retryable)) => Backoff,
            (Flushing, SendFailed(SendErrorKind::Fatal)) => Accumulating,
            (Flushing, SendFailed(SendErrorKind::Disabled)) => Paused,
            (Flushing, RetriesExhausted) => Accumulating,
            (Flushing, Interrupted) => Accumulating,

            (Backoff, BackoffElapsed) => Accumulating,
            (Backoff, Interrupted) => Accumulating,

            (Paused, Resumed) => Accumulating,

            (from, to) => {
                return Err(DomainError::InvalidState {
                    from: from.name().to_string(),
                    to: format!("{to:?}"),
                })
            }
        };

        Ok(next)
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState::Idle
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
