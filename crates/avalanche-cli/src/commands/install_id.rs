//! Install-id command - Print the per-install identifier

use anyhow::{Context, Result};
use clap::Args;

use crate::context::CliContext;

#[derive(Debug, Args)]
pub struct InstallIdCommand {}

impl InstallIdCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = ctx.formatter();
        let hub = ctx.open_hub().await?;

        let id = hub
            .install_id()
            .await
            .context("Failed to read the install id")?;
        hub.shutdown().await;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({ "install_id": id.to_string() }));
        } else {
            println!("{id}");
        }
        Ok(())
    }
}
