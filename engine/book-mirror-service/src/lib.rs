//! Book Mirror Production Service Library
//!
//! Configuration loading, logging setup, health monitoring and graceful
//! shutdown for the `book-mirror` binary.

use anyhow::{Context, Result};
use book_cache::BookMirrorService;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod config;
pub mod logging;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(config_file: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(config_file).context("Failed to load service configuration")
}

/// Periodically log the service health until aborted
pub fn spawn_health_monitor(
    service: Arc<BookMirrorService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let health = service.health_check().await;
            if health.is_healthy() {
                info!(
                    "Health OK: {} accounts, {} positions",
                    service.account_count(),
                    service.position_count()
                );
            } else {
                warn!("Health check failed: {:?}", health);
            }
        }
    })
}
