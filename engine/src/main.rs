// Switchboard Call Session Orchestrator
// Main entry point for the switchboard binary

use clap::Parser;
use switchboard_engine::cli::{Cli, Command};
use switchboard_engine::config::Config;
use switchboard_engine::handlers::{handle_check, handle_serve};
use switchboard_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Switchboard v{} ({} - {})", version, commit, timestamp);

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the requested log level
    // (only takes effect if RUST_LOG env var is not set)
    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.core.log_level.clone());
    init_telemetry_with_level(&level);

    match cli.command {
        Some(Command::Check) => handle_check(&config),
        Some(Command::Serve) | None => handle_serve(config).await,
    }
}
