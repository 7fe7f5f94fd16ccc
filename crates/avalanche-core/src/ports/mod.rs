//! Port definitions (hexagonal architecture interfaces)
//!
//! The pipeline core depends on these traits; their implementations live in
//! adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IEventStorage`] - Durable per-channel queue of pending events
//! - [`IIdentityStore`] / [`IPreferenceStore`] - Install identity and persisted flags
//! - [`IIngestion`] - Batch transmission to the backend
//! - [`IFeature`] / [`IEventEmitter`] - Feature modules and the entry point they push events through

pub mod event_storage;
pub mod feature;
pub mod identity_store;
pub mod ingestion;

pub use event_storage::IEventStorage;
pub use feature::{IEventEmitter, IFeature};
pub use identity_store::{IIdentityStore, IPreferenceStore};
pub use ingestion::IIngestion;
