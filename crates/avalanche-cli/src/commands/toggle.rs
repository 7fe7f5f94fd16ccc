//! Enable / disable commands - Flip the persisted enabled flag

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::context::CliContext;

#[derive(Debug, Args)]
pub struct ToggleCommand {}

impl ToggleCommand {
    pub async fn execute(&self, ctx: &CliContext, enabled: bool) -> Result<()> {
        let formatter = ctx.formatter();
        let hub = ctx.open_hub().await?;

        let previous = hub.is_enabled();
        hub.set_enabled(enabled).await;
        hub.shutdown().await;
        info!(previous, enabled, "Enabled flag updated");

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "enabled": enabled,
                "changed": previous != enabled,
            }));
        } else if previous == enabled {
            formatter.info(&format!(
                "Avalanche was already {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        } else if enabled {
            formatter.success("Avalanche enabled");
        } else {
            formatter.success("Avalanche disabled");
            formatter.info("Stored events are kept; new events are dropped until re-enabled.");
        }
        Ok(())
    }
}
