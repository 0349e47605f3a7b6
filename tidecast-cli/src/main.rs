//! Tidecast CLI - Command-line interface
//!
//! Provides command-line access to Tidecast functionality.

mod commands;

use clap::Parser;
use tidecast_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "tidecast")]
#[command(about = "A decentralized metered streaming client")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), None)
        .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    commands::handle_command(cli.command).await?;

    Ok(())
}
