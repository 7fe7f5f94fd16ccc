//! Identity and preference store ports
//!
//! Both are tiny durable key-value concerns. They are split so the install
//! identity can live in a secure store (keyring) while plain preferences
//! stay in the local database.

use crate::domain::InstallId;

/// Port trait for the durable install identity
#[async_trait::async_trait]
pub trait IIdentityStore: Send + Sync {
    /// Returns the stored identity, or `None` if none was saved yet
    async fn load(&self) -> anyhow::Result<Option<InstallId>>;

    /// Persists `id`, replacing any previous value
    async fn save(&self, id: &InstallId) -> anyhow::Result<()>;
}

/// Port trait for persisted facade preferences
#[async_trait::async_trait]
pub trait IPreferenceStore: Send + Sync {
    /// Returns the persisted global enabled flag, or `None` if never saved
    async fn load_enabled(&self) -> anyhow::Result<Option<bool>>;

    /// Persists the global enabled flag
    async fn save_enabled(&self, enabled: bool) -> anyhow::Result<()>;
}
