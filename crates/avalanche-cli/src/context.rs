//! Per-invocation settings shared by every command

use std::path::PathBuf;

use anyhow::{Context, Result};
use avalanche_core::config::Config;
use avalanche_hub::Avalanche;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

pub struct CliContext {
    pub format: OutputFormat,
    pub config_path: PathBuf,
}

impl CliContext {
    pub fn new(format: OutputFormat, config_path: Option<PathBuf>) -> Self {
        Self {
            format,
            config_path: config_path.unwrap_or_else(Config::default_path),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Configuration from `--config` or the default path, defaults if absent
    pub fn load_config(&self) -> Config {
        debug!(config_path = %self.config_path.display(), "Loading configuration");
        Config::load_or_default(&self.config_path)
    }

    /// Opens the hub over the configured database without starting it
    pub async fn open_hub(&self) -> Result<Avalanche> {
        let config = self.load_config();
        let path = config.storage.path.clone();
        Avalanche::open(config)
            .await
            .with_context(|| format!("Failed to open event database at {}", path.display()))
    }
}
