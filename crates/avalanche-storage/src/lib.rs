//! Avalanche Storage - Local persistence for the telemetry pipeline
//!
//! SQLite-based storage for:
//! - Pending events, one ordered queue per channel
//! - The install identity
//! - The persisted global enabled flag
//!
//! ## Architecture
//!
//! This crate implements the `IEventStorage`, `IIdentityStore` and
//! `IPreferenceStore` ports from `avalanche-core`. It is a driven (secondary)
//! adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteEventStorage`] - Durable `IEventStorage` with capacity eviction
//! - [`MemoryEventStorage`] - Non-durable `IEventStorage` with the same semantics
//! - [`SqliteKeyValueStore`] - `IIdentityStore` + `IPreferenceStore` over `kv_store`
//! - [`KeyringIdentityStore`] - `IIdentityStore` backed by the system keyring
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use avalanche_storage::{DatabasePool, SqliteEventStorage, StorageLimits};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/avalanche/events.db")).await?;
//! let storage = SqliteEventStorage::new(pool.pool().clone(), StorageLimits::default());
//! // Use storage as IEventStorage...
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod identity;
pub mod memory;
pub mod pool;

pub use events::{SqliteEventStorage, StorageLimits};
pub use identity::{KeyringIdentityStore, SqliteKeyValueStore};
pub use memory::MemoryEventStorage;
pub use pool::DatabasePool;

use avalanche_core::domain::StorageError;

/// Maps a sqlx failure onto the domain storage error
pub(crate) fn query_failed(e: sqlx::Error) -> StorageError {
    StorageError::QueryFailed(e.to_string())
}
