use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod core;
mod config;
mod error;

use crate::cli::Cli;
use crate::config::Settings;
use crate::core::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting repowiki v{}", env!("CARGO_PKG_VERSION"));

    cli.export_api_key();

    let settings = Settings::from_env(cli.config_dir.as_deref());
    let engine = Engine::new(settings, cli.backend())?;

    // Execute the requested command
    cli.execute(engine).await
}
