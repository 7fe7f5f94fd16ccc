//! Errors surfaced by the facade

use avalanche_channel::ChannelError;
use avalanche_core::domain::{ChannelName, StorageError};

/// Errors returned by [`Avalanche`](crate::Avalanche)
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Bad secret, duplicate feature, or invalid configuration values
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Channel {0} is disabled")]
    ChannelDisabled(ChannelName),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Avalanche has not been started")]
    NotStarted,

    #[error("Avalanche has been shut down")]
    ShutDown,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Identity store failed: {0}")]
    Identity(String),
}

impl From<ChannelError> for HubError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Disabled(name) => HubError::ChannelDisabled(name),
            ChannelError::UnknownChannel(name) => HubError::UnknownChannel(name),
            ChannelError::Closed(_) => HubError::ShutDown,
        }
    }
}
