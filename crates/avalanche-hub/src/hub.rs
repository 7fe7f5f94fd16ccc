//! The `Avalanche` context
//!
//! One process-wide context object, shared as `Arc<Avalanche>`. It owns the
//! global enabled flag, the hub logger, the install identity, the feature
//! registry and, once started, the channel group.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use avalanche_channel::{ChannelGroup, ChannelSnapshot};
use avalanche_core::config::{Config, IdentityBackend};
use avalanche_core::domain::{AppSecret, ChannelName, EventId, InstallId, Priority};
use avalanche_core::logging::{HubLogger, LogLevel};
use avalanche_core::ports::{IEventEmitter, IEventStorage, IFeature, IIdentityStore, IIngestion, IPreferenceStore};
use avalanche_ingestion::HttpIngestion;
use avalanche_storage::{
    DatabasePool, KeyringIdentityStore, MemoryEventStorage, SqliteEventStorage, SqliteKeyValueStore,
    StorageLimits,
};

use crate::emitter::HubEmitter;
use crate::error::HubError;

/// Builds the sender once the secret and install id are known
pub type IngestionFactory =
    Arc<dyn Fn(AppSecret, InstallId) -> Arc<dyn IIngestion> + Send + Sync>;

struct Pipeline {
    group: Arc<ChannelGroup>,
    emitter: Arc<dyn IEventEmitter>,
    secret: AppSecret,
}

struct FeatureEntry {
    feature: Arc<dyn IFeature>,
    channel: ChannelName,
    enabled: bool,
}

// ============================================================================
// Avalanche
// ============================================================================

/// Facade over the telemetry pipeline
pub struct Avalanche {
    config: Config,
    logger: Arc<HubLogger>,
    storage: Arc<dyn IEventStorage>,
    identity: Arc<dyn IIdentityStore>,
    preferences: Arc<dyn IPreferenceStore>,
    ingestion: IngestionFactory,
    /// Global enabled flag, shared with the channel group
    enabled: Arc<AtomicBool>,
    install_id: OnceCell<InstallId>,
    features: RwLock<BTreeMap<String, FeatureEntry>>,
    pipeline: OnceLock<Pipeline>,
    start_lock: Mutex<()>,
    shut_down: AtomicBool,
    /// Keeps the SQLite pool alive when the context opened it
    db: Option<DatabasePool>,
}

impl std::fmt::Debug for Avalanche {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Avalanche")
            .field("enabled", &self.is_enabled())
            .field("started", &self.is_started())
            .field("log_level", &self.log_level())
            .finish()
    }
}

impl Avalanche {
    pub fn builder(config: Config) -> AvalancheBuilder {
        AvalancheBuilder::new(config)
    }

    /// Opens the SQLite database named in `config.storage.path` and wires the
    /// HTTP sender
    pub async fn open(config: Config) -> Result<Self, HubError> {
        let path = config.storage.path.clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HubError::InvalidConfiguration(format!(
                    "Cannot create storage directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Self::open_at(config, &path).await
    }

    async fn open_at(config: Config, path: &Path) -> Result<Self, HubError> {
        let db = DatabasePool::new(path).await?;
        info!(path = %path.display(), "Opened event database");

        let storage = Arc::new(SqliteEventStorage::new(
            db.pool().clone(),
            StorageLimits::from(&config.storage),
        ));
        let kv = Arc::new(SqliteKeyValueStore::new(db.pool().clone()));
        let identity: Arc<dyn IIdentityStore> = match config.storage.identity_backend {
            IdentityBackend::Sqlite => kv.clone(),
            IdentityBackend::Keyring => {
                debug!("Install id kept in the system keyring");
                Arc::new(
                    KeyringIdentityStore::for_install_id()
                        .map_err(|e| HubError::Identity(format!("{e:#}")))?,
                )
            }
        };

        let mut hub = AvalancheBuilder::new(config)
            .storage(storage)
            .identity_store(identity)
            .preference_store(kv)
            .build()
            .await?;
        hub.db = Some(db);
        Ok(hub)
    }

    // ------------------------------------------------------------------------
    // Start-up
    // ------------------------------------------------------------------------

    /// Starts the pipeline and registers `features`
    ///
    /// The first successful call builds the pipeline. Later calls only add
    /// features that are not registered yet.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for an empty secret, a feature listed twice, or
    /// configuration that fails validation.
    pub async fn start(
        &self,
        app_secret: &str,
        features: Vec<Arc<dyn IFeature>>,
    ) -> Result<(), HubError> {
        let secret = AppSecret::new(app_secret)
            .map_err(|e| HubError::InvalidConfiguration(e.to_string()))?;

        let mut seen = HashSet::new();
        for feature in &features {
            if !seen.insert(feature.name().to_string()) {
                return Err(HubError::InvalidConfiguration(format!(
                    "Feature {} is listed more than once",
                    feature.name()
                )));
            }
        }

        let _guard = self.start_lock.lock().await;
        if self.shut_down.load(Ordering::Acquire) {
            return Err(HubError::ShutDown);
        }

        let pipeline = match self.pipeline.get() {
            Some(pipeline) => {
                if pipeline.secret != secret {
                    warn!("Avalanche already started with a different secret; keeping the first");
                    self.logger
                        .warning("Avalanche is already started; the new app secret is ignored");
                }
                pipeline
            }
            None => self.start_pipeline(secret).await?,
        };

        for feature in features {
            self.register(pipeline, feature);
        }
        Ok(())
    }

    async fn start_pipeline(&self, secret: AppSecret) -> Result<&Pipeline, HubError> {
        let problems = self.config.validate();
        if !problems.is_empty() {
            let joined = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(HubError::InvalidConfiguration(joined));
        }

        let install_id = self.install_id().await?;
        let ingestion = (self.ingestion)(secret.clone(), install_id);
        let group = Arc::new(
            ChannelGroup::with_global_flag(
                Arc::clone(&self.storage),
                ingestion,
                Arc::clone(&self.logger),
                Arc::clone(&self.enabled),
            )
            .with_abandon_in_flight(self.config.hub.abandon_in_flight_on_disable),
        );
        let emitter: Arc<dyn IEventEmitter> = Arc::new(HubEmitter::new(Arc::clone(&group)));

        info!(install_id = %install_id, enabled = self.is_enabled(), "Avalanche started");
        self.logger
            .info(&format!("Avalanche started with install id {install_id}"));

        // Serialized by start_lock, so the cell is still empty here
        let _ = self.pipeline.set(Pipeline {
            group,
            emitter,
            secret,
        });
        self.pipeline.get().ok_or(HubError::NotStarted)
    }

    fn register(&self, pipeline: &Pipeline, feature: Arc<dyn IFeature>) {
        let name = feature.name().to_string();
        let channel = feature.channel_name();
        let enabled = feature.default_enabled();

        {
            let mut registry = self.features.write().unwrap_or_else(|e| e.into_inner());
            if registry.contains_key(&name) {
                debug!(feature = %name, "Feature already registered");
                return;
            }
            registry.insert(
                name.clone(),
                FeatureEntry {
                    feature: Arc::clone(&feature),
                    channel: channel.clone(),
                    enabled,
                },
            );
        }

        let preferred = feature.channel_settings();
        let settings = self
            .config
            .channels
            .settings_with(&channel, preferred.as_ref());
        pipeline.group.add_channel(channel.clone(), settings, enabled);

        feature.set_enabled(self.is_enabled() && enabled);
        feature.on_started(Arc::clone(&pipeline.emitter));

        info!(feature = %name, channel = %channel, enabled, "Feature registered");
        self.logger
            .debug(&format!("Feature {name} started on channel {channel}"));
    }

    pub fn is_started(&self) -> bool {
        self.pipeline.get().is_some()
    }

    fn group(&self) -> Result<&Arc<ChannelGroup>, HubError> {
        self.pipeline
            .get()
            .map(|p| &p.group)
            .ok_or(HubError::NotStarted)
    }

    // ------------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turns the whole pipeline on or off and persists the choice
    ///
    /// Every channel observes the new flag before this returns; it shares one
    /// flag with the channel group. Disabling also clears pending backoff.
    /// Stored events are kept.
    pub async fn set_enabled(&self, enabled: bool) {
        let previous = {
            // Serialized with start so a group being built sees the flip
            let _guard = self.start_lock.lock().await;
            match self.pipeline.get() {
                Some(pipeline) => pipeline.group.set_enabled(enabled),
                None => self.enabled.swap(enabled, Ordering::AcqRel),
            }
        };

        let features: Vec<(Arc<dyn IFeature>, bool)> = self
            .features
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|entry| (Arc::clone(&entry.feature), entry.enabled))
            .collect();
        for (feature, feature_enabled) in features {
            feature.set_enabled(enabled && feature_enabled);
        }

        if previous != enabled {
            info!(enabled, "Avalanche toggled");
            self.logger.info(if enabled {
                "Avalanche enabled"
            } else {
                "Avalanche disabled"
            });
        }

        if let Err(e) = self.preferences.save_enabled(enabled).await {
            warn!(error = %format!("{e:#}"), "Failed to persist enabled flag");
            self.logger
                .error(&format!("Could not persist enabled state: {e:#}"));
        }
    }

    /// Turns one feature and its channel on or off
    pub fn set_feature_enabled(&self, name: &str, enabled: bool) -> Result<(), HubError> {
        let (feature, channel) = {
            let mut registry = self.features.write().unwrap_or_else(|e| e.into_inner());
            let entry = registry
                .get_mut(name)
                .ok_or_else(|| HubError::UnknownFeature(name.to_string()))?;
            entry.enabled = enabled;
            (Arc::clone(&entry.feature), entry.channel.clone())
        };

        self.group()?.set_channel_enabled(channel.as_str(), enabled)?;
        feature.set_enabled(self.is_enabled() && enabled);
        debug!(feature = name, enabled, "Feature toggled");
        Ok(())
    }

    pub fn is_feature_enabled(&self, name: &str) -> Option<bool> {
        self.features
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|entry| entry.enabled)
    }

    /// Registered feature names, sorted
    pub fn feature_names(&self) -> Vec<String> {
        self.features
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------------
    // Logging
    // ------------------------------------------------------------------------

    pub fn logger(&self) -> &Arc<HubLogger> {
        &self.logger
    }

    pub fn log_level(&self) -> LogLevel {
        self.logger.level()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.logger.set_level(level);
    }

    /// Installs the callback receiving every message that passes the level
    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        self.logger.set_handler(Some(Arc::new(handler)));
    }

    pub fn clear_log_handler(&self) {
        self.logger.set_handler(None);
    }

    // ------------------------------------------------------------------------
    // Install identity
    // ------------------------------------------------------------------------

    /// Returns the install id, creating and persisting it on first use
    pub async fn install_id(&self) -> Result<InstallId, HubError> {
        let id = self
            .install_id
            .get_or_try_init(|| async {
                let stored = self
                    .identity
                    .load()
                    .await
                    .map_err(|e| HubError::Identity(format!("{e:#}")))?;
                if let Some(id) = stored {
                    return Ok(id);
                }

                let id = InstallId::generate();
                self.identity
                    .save(&id)
                    .await
                    .map_err(|e| HubError::Identity(format!("{e:#}")))?;
                info!(install_id = %id, "Generated install id");
                Ok::<_, HubError>(id)
            })
            .await?;
        Ok(*id)
    }

    // ------------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------------

    /// Queues an event on a registered channel
    pub fn emit(
        &self,
        channel: &str,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<EventId, HubError> {
        Ok(self.group()?.enqueue(channel, payload, priority)?)
    }

    /// Sends everything pending on `channel` and waits for the drain to settle
    pub async fn flush(&self, channel: &str) -> Result<(), HubError> {
        Ok(self.group()?.flush(channel).await?)
    }

    pub async fn flush_all(&self) -> Result<(), HubError> {
        self.group()?.flush_all().await;
        Ok(())
    }

    pub async fn channel_status(&self, channel: &str) -> Result<ChannelSnapshot, HubError> {
        Ok(self.group()?.snapshot(channel).await?)
    }

    pub async fn channel_statuses(&self) -> Result<Vec<ChannelSnapshot>, HubError> {
        Ok(self.group()?.snapshots().await)
    }

    /// Pending events per channel, straight from storage
    ///
    /// Works before `start`, which the status command relies on.
    pub async fn stored_counts(&self) -> Result<Vec<(ChannelName, u64)>, HubError> {
        let mut counts = Vec::new();
        for channel in self.storage.channels().await? {
            let count = self.storage.count(&channel).await?;
            counts.push((channel, count));
        }
        Ok(counts)
    }

    pub fn evicted_total(&self) -> u64 {
        self.storage.evicted_total()
    }

    /// Stops every channel worker; stored events stay for the next start
    pub async fn shutdown(&self) {
        let _guard = self.start_lock.lock().await;
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pipeline) = self.pipeline.get() {
            pipeline.group.shutdown().await;
        }
        if let Some(db) = &self.db {
            db.close().await;
        }
        info!("Avalanche shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

// ============================================================================
// AvalancheBuilder
// ============================================================================

/// Assembles an [`Avalanche`] from explicit adapters
///
/// Storage defaults to a non-durable in-memory queue and the sender to
/// [`HttpIngestion`]; the identity and preference stores must be supplied.
pub struct AvalancheBuilder {
    config: Config,
    storage: Option<Arc<dyn IEventStorage>>,
    identity: Option<Arc<dyn IIdentityStore>>,
    preferences: Option<Arc<dyn IPreferenceStore>>,
    ingestion: Option<IngestionFactory>,
    logger: Option<Arc<HubLogger>>,
}

impl AvalancheBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            storage: None,
            identity: None,
            preferences: None,
            ingestion: None,
            logger: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn IEventStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn identity_store(mut self, identity: Arc<dyn IIdentityStore>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn preference_store(mut self, preferences: Arc<dyn IPreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Replaces the HTTP sender
    pub fn ingestion<F>(mut self, factory: F) -> Self
    where
        F: Fn(AppSecret, InstallId) -> Arc<dyn IIngestion> + Send + Sync + 'static,
    {
        self.ingestion = Some(Arc::new(factory));
        self
    }

    pub fn logger(mut self, logger: Arc<HubLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Builds the context and restores the persisted enabled flag
    pub async fn build(self) -> Result<Avalanche, HubError> {
        let identity = self.identity.ok_or_else(|| {
            HubError::InvalidConfiguration("No identity store configured".to_string())
        })?;
        let preferences = self.preferences.ok_or_else(|| {
            HubError::InvalidConfiguration("No preference store configured".to_string())
        })?;

        let config = self.config;
        let storage = match self.storage {
            Some(storage) => storage,
            None => {
                let memory: Arc<dyn IEventStorage> =
                    Arc::new(MemoryEventStorage::new(StorageLimits::from(&config.storage)));
                memory
            }
        };
        let ingestion = match self.ingestion {
            Some(factory) => factory,
            None => {
                let http_config = config.clone();
                let factory: IngestionFactory =
                    Arc::new(move |secret: AppSecret, install_id: InstallId| {
                        let client = HttpIngestion::from_config(&http_config, secret, install_id);
                        Arc::new(client) as Arc<dyn IIngestion>
                    });
                factory
            }
        };
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(HubLogger::new(config.log_level())));

        let enabled = match preferences.load_enabled().await {
            Ok(Some(enabled)) => {
                debug!(enabled, "Restored enabled flag");
                enabled
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to read enabled flag, assuming enabled");
                true
            }
        };

        Ok(Avalanche {
            config,
            logger,
            storage,
            identity,
            preferences,
            ingestion,
            enabled: Arc::new(AtomicBool::new(enabled)),
            install_id: OnceCell::new(),
            features: RwLock::new(BTreeMap::new()),
            pipeline: OnceLock::new(),
            start_lock: Mutex::new(()),
            shut_down: AtomicBool::new(false),
            db: None,
        })
    }
}
