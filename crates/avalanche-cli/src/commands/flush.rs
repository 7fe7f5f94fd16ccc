//! Flush command - Send pending events now
//!
//! Registers every channel that has stored events (or only the one given),
//! drains them through the configured ingestion endpoint and reports what
//! is left.

use anyhow::{Context, Result};
use avalanche_core::domain::ChannelName;
use clap::Args;
use tracing::info;

use crate::context::CliContext;
use crate::feature::ChannelFeature;

#[derive(Debug, Args)]
pub struct FlushCommand {
    /// Only flush this channel
    pub channel: Option<String>,

    /// Application secret sent with every batch
    #[arg(long, env = "AVALANCHE_APP_SECRET", hide_env_values = true)]
    pub secret: String,
}

impl FlushCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let hub = ctx.open_hub().await?;

        let channels: Vec<ChannelName> = match self.channel {
            Some(ref name) => vec![ChannelName::new(name).context("Invalid channel name")?],
            None => hub
                .stored_counts()
                .await
                .context("Failed to list channels")?
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
        };

        if channels.is_empty() {
            hub.shutdown().await;
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({ "channels": [] }));
            } else {
                formatter.info("Nothing to flush");
            }
            return Ok(());
        }

        if !hub.is_enabled() {
            hub.shutdown().await;
            formatter.error("Avalanche is disabled; run 'avalanche enable' first.");
            return Ok(());
        }

        let features = channels.iter().cloned().map(ChannelFeature::new).collect();
        hub.start(&self.secret, features)
            .await
            .context("Failed to start the pipeline")?;

        info!(channels = channels.len(), "Flushing");
        hub.flush_all().await.context("Failed to flush")?;
        let statuses = hub
            .channel_statuses()
            .await
            .context("Failed to read channel status")?;
        hub.shutdown().await;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({ "channels": statuses }));
            return Ok(());
        }

        let failed: Vec<_> = statuses.iter().filter(|s| s.pending > 0).collect();
        if failed.is_empty() {
            formatter.success(&format!("Flushed {} channel(s)", statuses.len()));
        } else {
            formatter.warn(&format!(
                "{} of {} channel(s) still have pending events",
                failed.len(),
                statuses.len()
            ));
        }
        for status in &statuses {
            let detail = match status.last_error {
                Some(ref error) => format!("{} pending ({error})", status.pending),
                None => format!("{} pending", status.pending),
            };
            formatter.field(&format!("  {}", status.name), &detail);
        }
        Ok(())
    }
}
