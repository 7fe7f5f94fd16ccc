//! Avalanche Channel - Per-channel batching and delivery
//!
//! Every channel runs as one tokio task (the channel worker). The worker
//! appends events to the shared [`IEventStorage`](avalanche_core::ports::IEventStorage),
//! watches the flush triggers (batch size, batch age, manual flush), hands
//! one batch at a time to the shared [`IIngestion`](avalanche_core::ports::IIngestion)
//! and reconciles the outcome through the [`ChannelState`](avalanche_core::domain::ChannelState)
//! machine.
//!
//! ## Key Components
//!
//! - [`ChannelGroup`] - Registry of workers sharing storage, sender and the global flag
//! - [`ChannelHandle`] - Non-blocking entry point into one worker
//! - [`BackoffPolicy`] - Exponential retry delay with jitter
//! - [`ChannelSnapshot`] - Point-in-time channel status

pub mod backoff;
pub mod group;
mod worker;

pub use backoff::BackoffPolicy;
pub use group::{ChannelError, ChannelGroup, ChannelHandle};
pub use worker::ChannelSnapshot;
