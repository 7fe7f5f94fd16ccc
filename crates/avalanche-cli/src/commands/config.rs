//! Config command - View and manage Avalanche configuration
//!
//! Provides the `avalanche config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports every error

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use avalanche_core::config::{Config, IdentityBackend};
use clap::Subcommand;
use tracing::info;

use crate::context::CliContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "channels.batch_size")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("hub.ingestion_url", "Base URL of the ingestion endpoint"),
    ("hub.send_timeout_secs", "Seconds before a send counts as failed"),
    ("hub.abandon_in_flight_on_disable", "true|false"),
    ("channels.batch_size", "Events per batch"),
    ("channels.max_batch_age_ms", "Oldest event age before a flush (0 = never)"),
    ("channels.max_retries", "Retries before events wait for the next trigger"),
    ("channels.backoff_base_ms", "First retry delay"),
    ("channels.backoff_max_ms", "Retry delay cap"),
    ("channels.jitter_factor", "0.0 - 1.0"),
    ("storage.path", "SQLite database file"),
    ("storage.max_events_per_channel", "Pending events kept per channel"),
    ("storage.max_events_total", "Pending events kept overall"),
    ("storage.identity_backend", "Install id store: sqlite or keyring"),
    ("rate_limiting.requests_per_second", "Sustained request rate"),
    ("rate_limiting.request_burst", "Back-to-back requests"),
    ("rate_limiting.bytes_per_second", "Sustained upload rate"),
    ("rate_limiting.byte_burst", "Back-to-back bytes"),
    ("logging.level", "verbose|debug|info|warning|error|assert|none"),
];

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
        Ok(())
    }

    fn execute_set(&self, ctx: &CliContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config();
        info!(key, value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": format!("{e:#}"),
                }));
            } else {
                formatter.error(&format!("Failed to set '{key}': {e:#}"));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {name:<36} {help}"));
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
        if !errors.is_empty() {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = ctx.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        let config = match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                let message = if path.exists() {
                    format!("Failed to parse configuration: {e:#}")
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [message],
                    }));
                } else if path.exists() {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", path.display()));
                } else {
                    formatter.info(&format!("Configuration file not found at {}", path.display()));
                    formatter.info("Using default configuration. Run 'avalanche config set <key> <value>' to create one.");
                }
                return Ok(());
            }
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.is_json() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value '{value}' for {key}"))
}

/// Applies a dot-notation key/value pair to `config`
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "hub.ingestion_url" => config.hub.ingestion_url = value.to_string(),
        "hub.send_timeout_secs" => config.hub.send_timeout_secs = parse(key, value)?,
        "hub.abandon_in_flight_on_disable" => {
            config.hub.abandon_in_flight_on_disable = parse(key, value)?
        }

        "channels.batch_size" => config.channels.batch_size = parse(key, value)?,
        "channels.max_batch_age_ms" => config.channels.max_batch_age_ms = parse(key, value)?,
        "channels.max_retries" => config.channels.max_retries = parse(key, value)?,
        "channels.backoff_base_ms" => config.channels.backoff_base_ms = parse(key, value)?,
        "channels.backoff_max_ms" => config.channels.backoff_max_ms = parse(key, value)?,
        "channels.jitter_factor" => config.channels.jitter_factor = parse(key, value)?,

        "storage.path" => config.storage.path = PathBuf::from(value),
        "storage.max_events_per_channel" => {
            config.storage.max_events_per_channel = parse(key, value)?
        }
        "storage.max_events_total" => config.storage.max_events_total = parse(key, value)?,
        "storage.identity_backend" => {
            config.storage.identity_backend = value
                .parse::<IdentityBackend>()
                .map_err(|e| anyhow!("Invalid value for {key}: {e}"))?
        }

        "rate_limiting.requests_per_second" => {
            config.rate_limiting.requests_per_second = parse(key, value)?
        }
        "rate_limiting.request_burst" => config.rate_limiting.request_burst = parse(key, value)?,
        "rate_limiting.bytes_per_second" => {
            config.rate_limiting.bytes_per_second = parse(key, value)?
        }
        "rate_limiting.byte_burst" => config.rate_limiting.byte_burst = parse(key, value)?,

        "logging.level" => config.logging.level = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{key}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_channel_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "channels.batch_size", "10").unwrap();
        apply_config_value(&mut config, "channels.max_batch_age_ms", "0").unwrap();
        apply_config_value(&mut config, "channels.jitter_factor", "0.5").unwrap();
        assert_eq!(config.channels.batch_size, 10);
        assert_eq!(config.channels.max_batch_age_ms, 0);
        assert_eq!(config.channels.jitter_factor, 0.5);
    }

    #[test]
    fn test_apply_hub_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "hub.ingestion_url", "http://localhost:8080").unwrap();
        apply_config_value(&mut config, "hub.abandon_in_flight_on_disable", "true").unwrap();
        assert_eq!(config.hub.ingestion_url, "http://localhost:8080");
        assert!(config.hub.abandon_in_flight_on_disable);
    }

    #[test]
    fn test_apply_storage_path() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.path", "/var/lib/avalanche/events.db").unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/avalanche/events.db"));
    }

    #[test]
    fn test_apply_identity_backend() {
        let mut config = Config::default();
        apply_config_value(&mut config, "storage.identity_backend", "keyring").unwrap();
        assert_eq!(config.storage.identity_backend, IdentityBackend::Keyring);

        let err = apply_config_value(&mut config, "storage.identity_backend", "vault").unwrap_err();
        assert!(format!("{err:#}").contains("storage.identity_backend"));
        assert_eq!(config.storage.identity_backend, IdentityBackend::Keyring);
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let mut config = Config::default();
        let err = apply_config_value(&mut config, "channels.batch_size", "many").unwrap_err();
        assert!(format!("{err:#}").contains("channels.batch_size"));
        assert_eq!(config.channels.batch_size, 50);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.root", "/tmp").is_err());
    }

    #[test]
    fn test_every_supported_key_is_applied() {
        let sample = |key: &str| match key {
            "hub.ingestion_url" => "https://example.com",
            "hub.abandon_in_flight_on_disable" => "false",
            "channels.jitter_factor" | "rate_limiting.requests_per_second" => "1.5",
            "storage.path" => "/tmp/events.db",
            "storage.identity_backend" => "keyring",
            "logging.level" => "debug",
            _ => "7",
        };
        let mut config = Config::default();
        for (key, _) in SUPPORTED_KEYS {
            apply_config_value(&mut config, key, sample(key))
                .unwrap_or_else(|e| panic!("{key}: {e:#}"));
        }
    }

    fn set(key: &str, value: &str) -> ConfigCommand {
        ConfigCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_set_writes_file_that_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.yaml");
        let ctx = CliContext::new(crate::output::OutputFormat::Json, Some(path.clone()));

        set("channels.batch_size", "5").execute(&ctx).await.unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.channels.batch_size, 5);
    }

    #[tokio::test]
    async fn test_set_refuses_invalid_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let ctx = CliContext::new(crate::output::OutputFormat::Json, Some(path.clone()));

        set("channels.batch_size", "0").execute(&ctx).await.unwrap();
        assert!(!path.exists());
    }
}
