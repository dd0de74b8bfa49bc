//! Book Mirror Production Service
//!
//! Loads the account and position snapshots from the bucket, keeps them
//! current from the live watch and valuation streams, and shuts down
//! gracefully on Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use book_cache::BookMirrorService;
use book_mirror_service::{
    graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers,
    spawn_health_monitor,
};

#[derive(Debug, Parser)]
#[command(name = "book-mirror", version, about = "Live account and position cache")]
struct Cli {
    /// TOML file with [service] and [logging] sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        book_mirror_service::config::validate_config(&config)?;
    }

    initialize_logging(&config.logging)?;

    info!("Starting Book Mirror v{}", env!("CARGO_PKG_VERSION"));
    info!("Schema: {}, bucket: {}", config.book.schema, config.book.bucket_name());

    let shutdown_timeout = Duration::from_secs(config.service.shutdown_timeout_secs);
    let health_interval = Duration::from_secs(config.service.health_check_interval_secs);

    // Blocks until both snapshots are loaded
    let service = Arc::new(
        BookMirrorService::connect(config.book)
            .await
            .context("Failed to start book mirror")?,
    );
    info!(
        "Snapshot loaded at {}: {} accounts, {} positions, {} instruments",
        service.cache_time(),
        service.account_count(),
        service.position_count(),
        service.instruments().len()
    );

    let shutdown_signal = setup_signal_handlers()?;
    let health_handle = spawn_health_monitor(service.clone(), health_interval);

    info!("Book Mirror is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service, health_handle, shutdown_timeout).await?;

    info!("Book Mirror shutdown complete");
    Ok(())
}
