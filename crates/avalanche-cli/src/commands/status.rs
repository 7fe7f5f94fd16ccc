//! Status command - Pending events per channel
//!
//! Reads the event database directly; nothing is sent.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::context::CliContext;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only show this channel
    pub channel: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let hub = ctx.open_hub().await?;

        let install_id = hub
            .install_id()
            .await
            .context("Failed to read the install id")?;
        let mut counts = hub
            .stored_counts()
            .await
            .context("Failed to count pending events")?;
        let enabled = hub.is_enabled();
        let database = hub.config().storage.path.clone();
        hub.shutdown().await;

        if let Some(ref wanted) = self.channel {
            counts.retain(|(name, _)| name.as_str() == wanted);
        }
        let total: u64 = counts.iter().map(|(_, count)| count).sum();
        info!(channels = counts.len(), total, "Showing status");

        if ctx.is_json() {
            let channels: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(name, count)| (name.to_string(), serde_json::json!(count)))
                .collect();
            formatter.print_json(&serde_json::json!({
                "enabled": enabled,
                "install_id": install_id.to_string(),
                "database": database.display().to_string(),
                "pending_total": total,
                "channels": channels,
            }));
            return Ok(());
        }

        formatter.success("Avalanche Status");
        formatter.info("");
        formatter.field("Enabled", if enabled { "yes" } else { "no" });
        formatter.field("Install ID", &install_id.to_string());
        formatter.field("Database", &database.display().to_string());
        formatter.field("Pending events", &total.to_string());
        formatter.info("");

        if counts.is_empty() {
            match self.channel {
                Some(ref wanted) => formatter.info(&format!("No pending events on {wanted}")),
                None => formatter.info("No pending events"),
            }
        } else {
            formatter.info("Channels:");
            for (name, count) in &counts {
                formatter.field(&format!("  {name}"), &count.to_string());
            }
        }
        Ok(())
    }
}
