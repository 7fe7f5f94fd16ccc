//! Avalanche CLI - Command-line interface for the local telemetry pipeline
//!
//! Provides commands for:
//! - Showing the install identity
//! - Inspecting pending events per channel
//! - Emitting test events and flushing channels
//! - Toggling the persisted enabled flag
//! - Viewing and editing configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod feature;
mod output;

use commands::{
    config::ConfigCommand, emit::EmitCommand, flush::FlushCommand,
    install_id::InstallIdCommand, status::StatusCommand, toggle::ToggleCommand,
};
use context::CliContext;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "avalanche", version, about = "Inspect and drive the Avalanche telemetry pipeline")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the install identity, creating it if needed
    InstallId(InstallIdCommand),
    /// Show pending events and the enabled flag
    Status(StatusCommand),
    /// Queue one event on a channel
    Emit(EmitCommand),
    /// Send pending events now
    Flush(FlushCommand),
    /// Turn delivery on
    Enable(ToggleCommand),
    /// Turn delivery off; new events are dropped until re-enabled
    Disable(ToggleCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext::new(format, cli.config);

    match cli.command {
        Commands::InstallId(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Emit(cmd) => cmd.execute(&ctx).await,
        Commands::Flush(cmd) => cmd.execute(&ctx).await,
        Commands::Enable(cmd) => cmd.execute(&ctx, true).await,
        Commands::Disable(cmd) => cmd.execute(&ctx, false).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
