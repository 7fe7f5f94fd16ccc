//! Shared fixtures: a recording feature and a recording sender

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use avalanche_core::config::{ChannelOverride, Config};
use avalanche_core::domain::{Ack, Batch, ChannelName, Priority, SendError};
use avalanche_core::logging::{HubLogger, LogLevel};
use avalanche_core::ports::{IEventEmitter, IEventStorage, IFeature, IIngestion};
use avalanche_hub::Avalanche;
use avalanche_storage::{DatabasePool, MemoryEventStorage, SqliteKeyValueStore};

pub const SECRET: &str = "test-app-secret";

/// Sender that acknowledges every batch and keeps it
#[derive(Default)]
pub struct RecordingIngestion {
    pub batches: Mutex<Vec<Batch>>,
}

impl RecordingIngestion {
    pub fn event_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Batch::len).sum()
    }
}

#[async_trait::async_trait]
impl IIngestion for RecordingIngestion {
    async fn send(&self, batch: &Batch) -> Result<Ack, SendError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(Ack::new(*batch.id()))
    }
}

/// Feature that remembers what the hub told it
pub struct RecordingFeature {
    name: String,
    channel: ChannelName,
    default_enabled: bool,
    pub enabled: AtomicBool,
    pub started: AtomicUsize,
    emitter: Mutex<Option<Arc<dyn IEventEmitter>>>,
}

impl RecordingFeature {
    pub fn new(name: &str, channel: &str) -> Arc<Self> {
        Self::with_default(name, channel, true)
    }

    pub fn with_default(name: &str, channel: &str, default_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            channel: ChannelName::new(channel).unwrap(),
            default_enabled,
            enabled: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            emitter: Mutex::new(None),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Emits through the hub-provided emitter
    pub fn track(&self, n: i64) {
        let emitter = self.emitter.lock().unwrap().clone();
        if let Some(emitter) = emitter {
            emitter.emit(&self.channel, serde_json::json!({ "n": n }), Priority::Normal);
        }
    }
}

impl IFeature for RecordingFeature {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_name(&self) -> ChannelName {
        self.channel.clone()
    }

    fn default_enabled(&self) -> bool {
        self.default_enabled
    }

    fn channel_settings(&self) -> Option<ChannelOverride> {
        Some(ChannelOverride {
            max_batch_age_ms: Some(0),
            ..Default::default()
        })
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn on_started(&self, emitter: Arc<dyn IEventEmitter>) {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.emitter.lock().unwrap() = Some(emitter);
    }
}

pub fn as_features(features: &[&Arc<RecordingFeature>]) -> Vec<Arc<dyn IFeature>> {
    features
        .iter()
        .map(|f| Arc::clone(f) as Arc<dyn IFeature>)
        .collect()
}

pub struct TestHub {
    pub hub: Avalanche,
    pub storage: Arc<MemoryEventStorage>,
    pub ingestion: Arc<RecordingIngestion>,
    pub logs: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

/// Hub over an in-memory queue and a given key-value database
pub async fn hub_on(db: &DatabasePool, config: Config) -> TestHub {
    let storage = Arc::new(MemoryEventStorage::default());
    let ingestion = Arc::new(RecordingIngestion::default());
    let kv = Arc::new(SqliteKeyValueStore::new(db.pool().clone()));

    let logs = Arc::new(Mutex::new(Vec::new()));
    let logger = Arc::new(HubLogger::new(LogLevel::Verbose));
    let sink = Arc::clone(&logs);
    logger.set_handler(Some(Arc::new(move |level: LogLevel, message: &str| {
        sink.lock().unwrap().push((level, message.to_string()));
    })));

    let sender = Arc::clone(&ingestion);
    let hub = Avalanche::builder(config)
        .storage(storage.clone() as Arc<dyn IEventStorage>)
        .identity_store(kv.clone())
        .preference_store(kv)
        .logger(logger)
        .ingestion(move |_secret, _install_id| Arc::clone(&sender) as Arc<dyn IIngestion>)
        .build()
        .await
        .expect("Failed to build hub");

    TestHub {
        hub,
        storage,
        ingestion,
        logs,
    }
}

pub async fn hub() -> (TestHub, DatabasePool) {
    let db = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    (hub_on(&db, Config::default()).await, db)
}
