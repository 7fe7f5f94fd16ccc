//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` with directory creation, WAL journaling,
//! embedded schema migration and an in-memory mode for tests.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use avalanche_core::domain::StorageError;

/// Pool of SQLite connections backing the event queue and key-value store
///
/// File databases use WAL with `synchronous = FULL` so a committed append
/// survives power loss, up to 5 connections and a 5-second busy timeout.
/// In-memory databases use a single connection (each connection would
/// otherwise see its own empty database).
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path` and migrates it
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionFailed` if the file cannot be opened,
    /// or `StorageError::MigrationFailed` if the schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StorageError::ConnectionFailed(format!(
                    "Failed to open event database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Event database opened");

        Ok(Self { pool })
    }

    /// Creates an in-memory database for tests and ephemeral sessions
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StorageError::ConnectionFailed(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory event database initialized");

        Ok(Self { pool })
    }

    /// Returns the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
        let migration_sql = include_str!("migrations/20261019_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                StorageError::MigrationFailed(format!("Failed to run initial migration: {e}"))
            })?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}
