//! Emit command - Queue one event on a channel
//!
//! Starts the pipeline with the target channel registered, queues the event
//! and, unless `--no-flush` is given, sends everything pending on that
//! channel before exiting.

use anyhow::{Context, Result};
use avalanche_core::domain::{ChannelName, Priority};
use avalanche_hub::HubError;
use clap::Args;
use tracing::info;

use crate::context::CliContext;
use crate::feature::ChannelFeature;

#[derive(Debug, Args)]
pub struct EmitCommand {
    /// Channel to emit on
    pub channel: String,

    /// Event payload as JSON
    pub payload: String,

    /// Event priority: low, normal, high or critical
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Application secret sent with every batch
    #[arg(long, env = "AVALANCHE_APP_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Leave the event queued instead of sending it now
    #[arg(long)]
    pub no_flush: bool,
}

impl EmitCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();

        let channel = ChannelName::new(&self.channel).context("Invalid channel name")?;
        let payload = parse_payload(&self.payload)?;

        let hub = ctx.open_hub().await?;
        hub.start(&self.secret, vec![ChannelFeature::new(channel.clone())])
            .await
            .context("Failed to start the pipeline")?;

        let event_id = match hub.emit(channel.as_str(), payload, self.priority) {
            Ok(id) => id,
            Err(HubError::ChannelDisabled(_)) => {
                hub.shutdown().await;
                formatter.error("Avalanche is disabled; run 'avalanche enable' first.");
                return Ok(());
            }
            Err(e) => {
                hub.shutdown().await;
                return Err(e).context("Failed to queue the event");
            }
        };
        info!(channel = %channel, event_id = %event_id, "Event queued");

        if !self.no_flush {
            hub.flush(channel.as_str())
                .await
                .context("Failed to flush the channel")?;
        }
        let status = hub
            .channel_status(channel.as_str())
            .await
            .context("Failed to read channel status")?;
        hub.shutdown().await;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "event_id": event_id.to_string(),
                "channel": channel.as_str(),
                "priority": self.priority.name(),
                "status": status,
            }));
            return Ok(());
        }

        formatter.success(&format!("Queued event {event_id} on {channel}"));
        formatter.field("Priority", self.priority.name());
        formatter.field("Pending", &status.pending.to_string());
        formatter.field("State", status.state.name());
        if let Some(ref error) = status.last_error {
            formatter.warn(&format!("Last send failed: {error}"));
        }
        Ok(())
    }
}

/// Parses the payload argument; bare words become JSON strings
fn parse_payload(raw: &str) -> Result<serde_json::Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Payload is not valid JSON");
    }
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(raw.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_payload() {
        let value = parse_payload(r#"{"screen":"home","ms":120}"#).unwrap();
        assert_eq!(value["screen"], "home");
        assert_eq!(value["ms"], 120);
    }

    #[test]
    fn test_malformed_object_is_rejected() {
        assert!(parse_payload(r#"{"screen":"#).is_err());
    }

    #[test]
    fn test_scalars_and_bare_words() {
        assert_eq!(parse_payload("42").unwrap(), serde_json::json!(42));
        assert_eq!(parse_payload("true").unwrap(), serde_json::json!(true));
        assert_eq!(parse_payload("launched").unwrap(), serde_json::json!("launched"));
    }
}
