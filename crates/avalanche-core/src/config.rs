//! Configuration module for the Avalanche pipeline.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ChannelName;
use crate::logging::LogLevel;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hub: HubConfig,
    pub channels: ChannelsConfig,
    pub storage: StorageConfig,
    pub rate_limiting: RateLimitingConfig,
    pub logging: LoggingConfig,
}

/// Facade and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the ingestion backend; batches are POSTed to `{url}/logs`.
    pub ingestion_url: String,
    /// Deadline for a single network call, in seconds.
    pub send_timeout_secs: u64,
    /// Abort in-flight sends when the SDK is disabled instead of letting them finish.
    pub abandon_in_flight_on_disable: bool,
}

/// Batching and retry defaults, with per-channel overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Pending events that trigger a flush.
    pub batch_size: usize,
    /// Age of the oldest pending event that triggers a flush, in ms. `0` disables the age trigger.
    pub max_batch_age_ms: u64,
    /// Retryable failures tolerated before the channel stops retrying a batch.
    pub max_retries: u32,
    /// First backoff delay, in ms.
    pub backoff_base_ms: u64,
    /// Upper bound of the backoff delay, in ms.
    pub backoff_max_ms: u64,
    /// Random spread applied to each delay, as a fraction (0.2 = ±10%).
    pub jitter_factor: f64,
    /// Per-channel overrides keyed by channel name.
    pub overrides: BTreeMap<String, ChannelOverride>,
}

/// Partial channel settings; unset fields fall back to [`ChannelsConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOverride {
    pub batch_size: Option<usize>,
    pub max_batch_age_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub jitter_factor: Option<f64>,
}

/// Persistent queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Pending events kept per channel before eviction.
    pub max_events_per_channel: u64,
    /// Pending events kept across all channels before eviction.
    pub max_events_total: u64,
    /// Where the install identity lives.
    pub identity_backend: IdentityBackend,
}

/// Store holding the install identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// The `kv_store` table of the event database.
    #[default]
    Sqlite,
    /// The system keyring (Secret Service on Linux).
    Keyring,
}

impl std::str::FromStr for IdentityBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(IdentityBackend::Sqlite),
            "keyring" => Ok(IdentityBackend::Keyring),
            other => Err(format!("unknown identity backend '{other}' (expected sqlite or keyring)")),
        }
    }
}

/// Shared outbound budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Sustained request rate across all channels.
    pub requests_per_second: f64,
    /// Requests that may be sent back-to-back.
    pub request_burst: u32,
    /// Sustained upload rate in bytes per second.
    pub bytes_per_second: u64,
    /// Bytes that may be sent back-to-back.
    pub byte_burst: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `verbose`, `debug`, `info`, `warning`, `error`, `assert`, or `none`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Resolved per-channel settings
// ---------------------------------------------------------------------------

/// Effective batching and retry policy of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub batch_size: usize,
    /// `None` means the age trigger never fires.
    pub max_batch_age: Option<Duration>,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_factor: f64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelsConfig::default().defaults()
    }
}

impl ChannelSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_batch_age(mut self, age: Option<Duration>) -> Self {
        self.max_batch_age = age;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }
}

fn age_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl ChannelsConfig {
    /// Settings with no override applied.
    pub fn defaults(&self) -> ChannelSettings {
        ChannelSettings {
            batch_size: self.batch_size,
            max_batch_age: age_from_ms(self.max_batch_age_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            jitter_factor: self.jitter_factor,
        }
    }

    /// Settings for `channel`, with its override (if any) applied.
    pub fn settings_for(&self, channel: &ChannelName) -> ChannelSettings {
        self.settings_with(channel, None)
    }

    /// Settings for `channel` layered as defaults, then `preferred`, then the
    /// configured override.
    pub fn settings_with(
        &self,
        channel: &ChannelName,
        preferred: Option<&ChannelOverride>,
    ) -> ChannelSettings {
        let mut settings = self.defaults();
        if let Some(o) = preferred {
            o.apply_to(&mut settings);
        }
        if let Some(o) = self.overrides.get(channel.as_str()) {
            o.apply_to(&mut settings);
        }
        settings
    }
}

impl ChannelOverride {
    /// Overwrites every field of `settings` this override sets.
    pub fn apply_to(&self, settings: &mut ChannelSettings) {
        if let Some(n) = self.batch_size {
            settings.batch_size = n;
        }
        if let Some(ms) = self.max_batch_age_ms {
            settings.max_batch_age = age_from_ms(ms);
        }
        if let Some(n) = self.max_retries {
            settings.max_retries = n;
        }
        if let Some(ms) = self.backoff_base_ms {
            settings.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_max_ms {
            settings.backoff_max = Duration::from_millis(ms);
        }
        if let Some(f) = self.jitter_factor {
            settings.jitter_factor = f;
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/avalanche/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("avalanche")
            .join("config.yaml")
    }

    /// Send timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.hub.send_timeout_secs)
    }

    /// Parsed log level, falling back to the default on an invalid value.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ingestion_url: "https://in.avalanch.es".to_string(),
            send_timeout_secs: 30,
            abandon_in_flight_on_disable: false,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_batch_age_ms: 3_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            jitter_factor: 0.2,
            overrides: BTreeMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("avalanche")
                .join("events.db"),
            max_events_per_channel: 1_000,
            max_events_total: 10_000,
            identity_backend: IdentityBackend::Sqlite,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            request_burst: 20,
            bytes_per_second: 1024 * 1024,
            byte_burst: 4 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default().name().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"channels.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn positive(errors: &mut Vec<ValidationError>, field: &str, is_zero: bool) {
    if is_zero {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn check_backoff(errors: &mut Vec<ValidationError>, prefix: &str, base: u64, max: u64, jitter: f64) {
    if base == 0 {
        errors.push(ValidationError {
            field: format!("{prefix}.backoff_base_ms"),
            message: "must be greater than 0".into(),
        });
    }
    if base > max {
        errors.push(ValidationError {
            field: format!("{prefix}.backoff_max_ms"),
            message: format!("backoff_max_ms ({max}) must not be below backoff_base_ms ({base})"),
        });
    }
    if !(0.0..=1.0).contains(&jitter) {
        errors.push(ValidationError {
            field: format!("{prefix}.jitter_factor"),
            message: "must be in range 0.0..=1.0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- hub ---
        let url = self.hub.ingestion_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "hub.ingestion_url".into(),
                message: format!("must start with http:// or https://, got '{url}'"),
            });
        }
        positive(&mut errors, "hub.send_timeout_secs", self.hub.send_timeout_secs == 0);

        // --- channels ---
        positive(&mut errors, "channels.batch_size", self.channels.batch_size == 0);
        check_backoff(
            &mut errors,
            "channels",
            self.channels.backoff_base_ms,
            self.channels.backoff_max_ms,
            self.channels.jitter_factor,
        );

        for (name, o) in &self.channels.overrides {
            let prefix = format!("channels.overrides.{name}");
            if let Err(e) = ChannelName::new(name.as_str()) {
                errors.push(ValidationError {
                    field: prefix.clone(),
                    message: e.to_string(),
                });
            }
            if o.batch_size == Some(0) {
                errors.push(ValidationError {
                    field: format!("{prefix}.batch_size"),
                    message: "must be greater than 0".into(),
                });
            }
            check_backoff(
                &mut errors,
                &prefix,
                o.backoff_base_ms.unwrap_or(self.channels.backoff_base_ms),
                o.backoff_max_ms.unwrap_or(self.channels.backoff_max_ms),
                o.jitter_factor.unwrap_or(self.channels.jitter_factor),
            );
        }

        // --- storage ---
        positive(
            &mut errors,
            "storage.max_events_per_channel",
            self.storage.max_events_per_channel == 0,
        );
        positive(
            &mut errors,
            "storage.max_events_total",
            self.storage.max_events_total == 0,
        );
        if self.storage.max_events_per_channel > self.storage.max_events_total {
            errors.push(ValidationError {
                field: "storage.max_events_per_channel".into(),
                message: format!(
                    "max_events_per_channel ({}) must not exceed max_events_total ({})",
                    self.storage.max_events_per_channel, self.storage.max_events_total
                ),
            });
        }

        // --- rate_limiting ---
        if self.rate_limiting.requests_per_second <= 0.0 {
            errors.push(ValidationError {
                field: "rate_limiting.requests_per_second".into(),
                message: "must be greater than 0".into(),
            });
        }
        positive(
            &mut errors,
            "rate_limiting.request_burst",
            self.rate_limiting.request_burst == 0,
        );
        positive(
            &mut errors,
            "rate_limiting.bytes_per_second",
            self.rate_limiting.bytes_per_second == 0,
        );
        positive(
            &mut errors,
            "rate_limiting.byte_burst",
            self.rate_limiting.byte_burst == 0,
        );

        // --- logging ---
        if self.logging.level.parse::<LogLevel>().is_err() {
            let valid: Vec<&str> = LogLevel::ALL.iter().map(|l| l.name()).collect();
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    valid.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use avalanche_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .ingestion_url("http://localhost:8080")
///     .batch_size(20)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.channels.batch_size, 20);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- hub ---

    pub fn ingestion_url(mut self, url: impl Into<String>) -> Self {
        self.config.hub.ingestion_url = url.into();
        self
    }

    pub fn send_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.hub.send_timeout_secs = seconds;
        self
    }

    pub fn abandon_in_flight_on_disable(mut self, abandon: bool) -> Self {
        self.config.hub.abandon_in_flight_on_disable = abandon;
        self
    }

    // --- channels ---

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.channels.batch_size = n;
        self
    }

    pub fn max_batch_age_ms(mut self, ms: u64) -> Self {
        self.config.channels.max_batch_age_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.channels.max_retries = n;
        self
    }

    pub fn backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.config.channels.backoff_base_ms = base;
        self.config.channels.backoff_max_ms = max;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.channels.jitter_factor = factor;
        self
    }

    pub fn channel_override(mut self, channel: impl Into<String>, o: ChannelOverride) -> Self {
        self.config.channels.overrides.insert(channel.into(), o);
        self
    }

    // --- storage ---

    pub fn storage_path(mut self, path: PathBuf) -> Self {
        self.config.storage.path = path;
        self
    }

    pub fn storage_limits(mut self, per_channel: u64, total: u64) -> Self {
        self.config.storage.max_events_per_channel = per_channel;
        self.config.storage.max_events_total = total;
        self
    }

    pub fn identity_backend(mut self, backend: IdentityBackend) -> Self {
        self.config.storage.identity_backend = backend;
        self
    }

    // --- rate_limiting ---

    pub fn requests_per_second(mut self, rate: f64, burst: u32) -> Self {
        self.config.rate_limiting.requests_per_second = rate;
        self.config.rate_limiting.request_burst = burst;
        self
    }

    pub fn bytes_per_second(mut self, rate: u64, burst: u64) -> Self {
        self.config.rate_limiting.bytes_per_second = rate;
        self.config.rate_limiting.byte_burst = burst;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.hub.send_timeout_secs, 30);
        assert!(!cfg.hub.abandon_in_flight_on_disable);
        assert_eq!(cfg.channels.batch_size, 50);
        assert_eq!(cfg.channels.max_batch_age_ms, 3_000);
        assert_eq!(cfg.channels.max_retries, 3);
        assert_eq!(cfg.storage.max_events_per_channel, 1_000);
        assert_eq!(cfg.storage.max_events_total, 10_000);
        assert_eq!(cfg.storage.identity_backend, IdentityBackend::Sqlite);
        assert!(cfg.storage.path.to_string_lossy().contains("avalanche"));
        assert_eq!(cfg.log_level(), LogLevel::Warning);
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
hub:
  ingestion_url: http://localhost:9000
  send_timeout_secs: 5
channels:
  batch_size: 20
  max_batch_age_ms: 0
  overrides:
    crashes:
      batch_size: 1
storage:
  path: /tmp/avalanche-test/events.db
  max_events_per_channel: 100
  max_events_total: 500
  identity_backend: keyring
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.hub.ingestion_url, "http://localhost:9000");
        assert_eq!(cfg.send_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.channels.batch_size, 20);
        assert_eq!(cfg.storage.max_events_total, 500);
        assert_eq!(cfg.storage.identity_backend, IdentityBackend::Keyring);
        assert_eq!(cfg.log_level(), LogLevel::Debug);
        // Sections missing from the file keep their defaults
        assert_eq!(cfg.rate_limiting.request_burst, 20);
        assert_eq!(cfg.channels.max_retries, 3);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.channels.batch_size, 50);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Channel settings --

    #[test]
    fn settings_for_applies_override() {
        let cfg = ConfigBuilder::new()
            .batch_size(50)
            .channel_override(
                "crashes",
                ChannelOverride {
                    batch_size: Some(1),
                    max_batch_age_ms: Some(0),
                    ..Default::default()
                },
            )
            .build();

        let crashes = cfg
            .channels
            .settings_for(&ChannelName::new("crashes").unwrap());
        assert_eq!(crashes.batch_size, 1);
        assert_eq!(crashes.max_batch_age, None);

        let analytics = cfg
            .channels
            .settings_for(&ChannelName::new("analytics").unwrap());
        assert_eq!(analytics.batch_size, 50);
        assert_eq!(analytics.max_batch_age, Some(Duration::from_secs(3)));
    }

    #[test]
    fn configured_override_wins_over_preferred() {
        let cfg = ConfigBuilder::new()
            .channel_override(
                "crashes",
                ChannelOverride {
                    batch_size: Some(5),
                    ..Default::default()
                },
            )
            .build();
        let preferred = ChannelOverride {
            batch_size: Some(1),
            max_retries: Some(10),
            ..Default::default()
        };

        let crashes = cfg
            .channels
            .settings_with(&ChannelName::new("crashes").unwrap(), Some(&preferred));
        assert_eq!(crashes.batch_size, 5);
        assert_eq!(crashes.max_retries, 10);
    }

    #[test]
    fn zero_age_means_no_age_trigger() {
        let cfg = ConfigBuilder::new().max_batch_age_ms(0).build();
        assert_eq!(cfg.channels.defaults().max_batch_age, None);
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_batch_size() {
        let cfg = ConfigBuilder::new().batch_size(0).build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "channels.batch_size"));
    }

    #[test]
    fn validate_catches_inverted_backoff() {
        let cfg = ConfigBuilder::new().backoff_ms(5_000, 1_000).build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "channels.backoff_max_ms"));
    }

    #[test]
    fn validate_catches_bad_jitter() {
        let cfg = ConfigBuilder::new().jitter_factor(1.5).build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "channels.jitter_factor"));
    }

    #[test]
    fn validate_catches_bad_url() {
        let cfg = ConfigBuilder::new().ingestion_url("ftp://example").build();
        assert!(cfg.validate().iter().any(|e| e.field == "hub.ingestion_url"));
    }

    #[test]
    fn validate_catches_storage_caps() {
        let cfg = ConfigBuilder::new().storage_limits(200, 100).build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "storage.max_events_per_channel"));
    }

    #[test]
    fn validate_catches_invalid_override_name() {
        let cfg = ConfigBuilder::new()
            .channel_override("bad name", ChannelOverride::default())
            .build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "channels.overrides.bad name"));
    }

    #[test]
    fn validate_catches_bad_log_level() {
        let cfg = ConfigBuilder::new().logging_level("chatty").build();
        let errors = cfg.validate();
        let err = errors
            .iter()
            .find(|e| e.field == "logging.level")
            .expect("logging.level error");
        assert!(err.message.contains("verbose"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let cfg = ConfigBuilder::new()
            .batch_size(0)
            .requests_per_second(0.0, 0)
            .build();
        assert!(cfg.validate().len() >= 3);
    }

    #[test]
    fn identity_backend_parses_case_insensitively() {
        assert_eq!("sqlite".parse::<IdentityBackend>(), Ok(IdentityBackend::Sqlite));
        assert_eq!("Keyring".parse::<IdentityBackend>(), Ok(IdentityBackend::Keyring));
        assert!("vault".parse::<IdentityBackend>().is_err());

        let cfg = ConfigBuilder::new()
            .identity_backend(IdentityBackend::Keyring)
            .build();
        assert_eq!(cfg.storage.identity_backend, IdentityBackend::Keyring);
    }
}
