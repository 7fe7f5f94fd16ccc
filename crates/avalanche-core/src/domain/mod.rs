//! Domain model for the telemetry pipeline
//!
//! - [`Event`] / [`StoredEvent`] - immutable telemetry records and their storage tokens
//! - [`Batch`] - ordered group of stored events transmitted as one unit
//! - [`ChannelState`] - per-channel delivery state machine
//! - [`newtypes`] - validated identifiers (`ChannelName`, `EventToken`, `InstallId`, ...)
//! - [`errors`] - domain, storage and send error taxonomy

pub mod batch;
pub mod channel_state;
pub mod errors;
pub mod event;
pub mod newtypes;

pub use batch::{Ack, Batch};
pub use channel_state::{ChannelState, ChannelTransition};
pub use errors::{DomainError, SendError, SendErrorKind, StorageError};
pub use event::{Event, Priority, StoredEvent};
pub use newtypes::{AppSecret, BatchId, ChannelName, EventId, EventToken, InstallId};
