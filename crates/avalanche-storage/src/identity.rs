//! Install identity and preference stores
//!
//! - [`SqliteKeyValueStore`] - `kv_store` table; holds both the install id
//!   and the persisted enabled flag
//! - [`KeyringIdentityStore`] - install id kept in the OS credential store

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use avalanche_core::domain::InstallId;
use avalanche_core::ports::{IIdentityStore, IPreferenceStore};

/// Key under which the install identity is stored
pub const INSTALL_ID_KEY: &str = "install_id";

/// Key under which the global enabled flag is stored
pub const ENABLED_KEY: &str = "enabled";

/// Keyring service name for the install identity
const KEYRING_SERVICE: &str = "avalanche";

/// Keyring user for the install identity
const KEYRING_USER: &str = "install-id";

// ============================================================================
// SQLite key-value store
// ============================================================================

/// Durable string values in the `kv_store` table
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read '{key}'"))?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write '{key}'"))?;

        tracing::trace!(key, "Stored value");
        Ok(())
    }
}

#[async_trait::async_trait]
impl IIdentityStore for SqliteKeyValueStore {
    async fn load(&self) -> Result<Option<InstallId>> {
        match self.get(INSTALL_ID_KEY).await? {
            Some(raw) => {
                let id = InstallId::from_str(&raw)
                    .with_context(|| format!("Stored install id is not a UUID: '{raw}'"))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, id: &InstallId) -> Result<()> {
        self.set(INSTALL_ID_KEY, &id.to_string()).await
    }
}

#[async_trait::async_trait]
impl IPreferenceStore for SqliteKeyValueStore {
    async fn load_enabled(&self) -> Result<Option<bool>> {
        match self.get(ENABLED_KEY).await?.as_deref() {
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => anyhow::bail!("Stored enabled flag is not a boolean: '{other}'"),
            None => Ok(None),
        }
    }

    async fn save_enabled(&self, enabled: bool) -> Result<()> {
        self.set(ENABLED_KEY, if enabled { "true" } else { "false" })
            .await
    }
}

// ============================================================================
// Keyring store
// ============================================================================

/// Keeps the install identity in the system keyring
///
/// Keyring calls block on D-Bus, so they run on the blocking pool.
#[derive(Clone)]
pub struct KeyringIdentityStore {
    service: String,
    entry: Arc<keyring::Entry>,
}

impl std::fmt::Debug for KeyringIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringIdentityStore")
            .field("service", &self.service)
            .finish()
    }
}

impl KeyringIdentityStore {
    pub fn new(service: impl Into<String>, user: &str) -> Result<Self> {
        let service = service.into();
        let entry =
            keyring::Entry::new(&service, user).context("Failed to create keyring entry")?;
        Ok(Self {
            service,
            entry: Arc::new(entry),
        })
    }

    /// Store under the default service and user names
    pub fn for_install_id() -> Result<Self> {
        Self::new(KEYRING_SERVICE, KEYRING_USER)
    }

    /// Removes the stored identity; missing entries are not an error
    pub async fn clear(&self) -> Result<()> {
        let entry = Arc::clone(&self.entry);
        tokio::task::spawn_blocking(move || match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        })
        .await
        .context("Keyring task panicked")?
    }
}

#[async_trait::async_trait]
impl IIdentityStore for KeyringIdentityStore {
    async fn load(&self) -> Result<Option<InstallId>> {
        let entry = Arc::clone(&self.entry);
        let secret = tokio::task::spawn_blocking(move || match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        })
        .await
        .context("Keyring task panicked")??;

        match secret {
            Some(raw) => {
                debug!(service = %self.service, "Loaded install id from keyring");
                let id = InstallId::from_str(&raw)
                    .context("Keyring install id is not a UUID")?;
                Ok(Some(id))
            }
            None => {
                debug!(service = %self.service, "No install id in keyring");
                Ok(None)
            }
        }
    }

    async fn save(&self, id: &InstallId) -> Result<()> {
        let entry = Arc::clone(&self.entry);
        let value = id.to_string();
        tokio::task::spawn_blocking(move || {
            entry
                .set_password(&value)
                .context("Failed to store install id in keyring")
        })
        .await
        .context("Keyring task panicked")??;

        debug!(service = %self.service, "Stored install id in keyring");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabasePool;

    async fn setup() -> SqliteKeyValueStore {
        let db = DatabasePool::in_memory().await.unwrap();
        SqliteKeyValueStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_identity_absent_then_saved() {
        let store = setup().await;
        assert!(IIdentityStore::load(&store).await.unwrap().is_none());

        let id = InstallId::generate();
        store.save(&id).await.unwrap();
        assert_eq!(IIdentityStore::load(&store).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = setup().await;
        store.save(&InstallId::generate()).await.unwrap();
        let second = InstallId::generate();
        store.save(&second).await.unwrap();
        assert_eq!(IIdentityStore::load(&store).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_corrupted_identity_is_an_error() {
        let store = setup().await;
        store.set(INSTALL_ID_KEY, "not-a-uuid").await.unwrap();
        assert!(IIdentityStore::load(&store).await.is_err());
    }

    #[tokio::test]
    async fn test_enabled_flag_roundtrip() {
        let store = setup().await;
        assert_eq!(store.load_enabled().await.unwrap(), None);
        store.save_enabled(false).await.unwrap();
        assert_eq!(store.load_enabled().await.unwrap(), Some(false));
        store.save_enabled(true).await.unwrap();
        assert_eq!(store.load_enabled().await.unwrap(), Some(true));
    }

    fn mock_keyring() -> KeyringIdentityStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringIdentityStore::new("avalanche-test", "install-id").unwrap()
    }

    #[tokio::test]
    async fn test_keyring_load_save_clear() {
        let store = mock_keyring();
        assert!(store.load().await.unwrap().is_none());

        let id = InstallId::generate();
        store.save(&id).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(id));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_keyring_rejects_corrupted_identity() {
        let store = mock_keyring();
        store.entry.set_password("not-a-uuid").unwrap();
        assert!(store.load().await.is_err());
    }
}
