//! Avalanche Hub - The facade over the telemetry pipeline
//!
//! [`Avalanche`] is an explicit context object rather than a global: build
//! it once, share it as `Arc<Avalanche>`, and hand features the
//! [`IEventEmitter`](avalanche_core::ports::IEventEmitter) it creates on
//! start.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use avalanche_core::config::Config;
//! use avalanche_hub::Avalanche;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let hub = Arc::new(Avalanche::open(Config::default()).await?);
//! hub.start("app-secret", Vec::new()).await?;
//! println!("install id: {}", hub.install_id().await?);
//! hub.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod emitter;
pub mod error;
pub mod hub;

pub use emitter::HubEmitter;
pub use error::HubError;
pub use hub::{Avalanche, AvalancheBuilder, IngestionFactory};
