//! ## nfproxy-cli
//! **Operator interface for filter scripts**
//!
//! `check` compiles a script and prints the resulting pipeline; `replay`
//! runs a recorded trace through it and prints one verdict per packet.

use clap::Parser;
use nfproxy_config::NfproxyConfig;
use nfproxy_telemetry::logging::EventLogger;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NfproxyConfig::load_from_path(path)?,
        None => NfproxyConfig::load()?,
    };
    EventLogger::init(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Check(args) => commands::check(args, &config),
        Commands::Replay(args) => commands::replay(args, &config).await,
    }
}
