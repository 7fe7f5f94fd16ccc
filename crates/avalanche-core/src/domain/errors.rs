//! Domain error types
//!
//! This module defines the error taxonomy shared by every pipeline layer:
//! validation failures and invalid state transitions ([`DomainError`]),
//! persistent queue failures ([`StorageError`]) and classified transmission
//! failures ([`SendError`]).

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid channel name format or content
    #[error("Invalid channel name: {0}")]
    InvalidChannelName(String),

    /// Application secret is empty or malformed
    #[error("Invalid application secret: {0}")]
    InvalidSecret(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted transition
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Errors raised by persistent queue adapters
///
/// Storage errors never terminate the host: callers log them and degrade to
/// dropped telemetry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failed to open or connect to the backing store
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),

    /// A read or write against the backing store failed
    #[error("Storage query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Storage migration failed: {0}")]
    MigrationFailed(String),

    /// A stored record could not be decoded
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// Serialization of an event failed before it could be written
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Classification of a send failure, which determines the channel reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendErrorKind {
    /// Transient: network, timeout, 5xx, 429. Drives backoff.
    Retryable,
    /// Permanent: 4xx or malformed payload. The batch is dropped.
    Fatal,
    /// The backend asked the client to stop sending. The channel pauses.
    Disabled,
}

impl SendErrorKind {
    /// Returns the classification name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            SendErrorKind::Retryable => "retryable",
            SendErrorKind::Fatal => "fatal",
            SendErrorKind::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for SendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classified failure of a batch transmission
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transient failure; the batch should be retried after backoff
    #[error("Retryable send failure: {reason}")]
    Retryable {
        /// Human-readable cause
        reason: String,
        /// Server-provided delay hint (e.g. `Retry-After`)
        retry_after: Option<Duration>,
    },

    /// Permanent failure; the batch will never be accepted
    #[error("Fatal send failure (status {status:?}): {reason}")]
    Fatal {
        /// HTTP status when the failure came from a response
        status: Option<u16>,
        /// Human-readable cause
        reason: String,
    },

    /// Backend instructed the client to pause ingestion
    #[error("Ingestion disabled by backend: {reason}")]
    Disabled {
        /// Human-readable cause
        reason: String,
    },
}

impl SendError {
    /// Creates a retryable error without a server delay hint
    pub fn retryable(reason: impl Into<String>) -> Self {
        SendError::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }

    /// Creates a fatal error that did not originate from an HTTP response
    pub fn fatal(reason: impl Into<String>) -> Self {
        SendError::Fatal {
            status: None,
            reason: reason.into(),
        }
    }

    /// Creates a disabled error
    pub fn disabled(reason: impl Into<String>) -> Self {
        SendError::Disabled {
            reason: reason.into(),
        }
    }

    /// Returns the classification of this error
    pub fn kind(&self) -> SendErrorKind {
        match self {
            SendError::Retryable { .. } => SendErrorKind::Retryable,
            SendError::Fatal { .. } => SendErrorKind::Fatal,
            SendError::Disabled { .. } => SendErrorKind::Disabled,
        }
    }

    /// Returns the server-provided retry hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
