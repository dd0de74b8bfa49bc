//! Service configuration management

use anyhow::{Context, Result};
use book_cache::BookConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Cache, database and Redis configuration
    pub book: BookConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Interval between health checks in seconds
    pub health_check_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

/// Optional TOML file layered under the environment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    service: Option<ServiceSettings>,
    logging: Option<LoggingConfig>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { shutdown_timeout_secs: 10, health_check_interval_secs: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Load configuration from an optional file and environment variables
pub fn load_config(config_file: Option<&Path>) -> Result<ServiceConfig> {
    // A missing .env file is fine; deployments set the environment directly
    dotenv::dotenv().ok();

    let mut config = ServiceConfig {
        book: BookConfig::from_env().context("Failed to load book configuration")?,
        ..Default::default()
    };

    let config_file = config_file
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("BOOK_CONFIG_FILE").ok().map(PathBuf::from));

    if let Some(path) = config_file {
        tracing::debug!("Loading configuration from file: {:?}", path);
        load_from_file(&mut config, &path)?;
    }

    load_from_env(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

/// Apply the `[service]` and `[logging]` sections of a TOML file
fn load_from_file(config: &mut ServiceConfig, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
    let file: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse configuration file: {:?}", path))?;

    if let Some(service) = file.service {
        config.service = service;
    }
    if let Some(logging) = file.logging {
        config.logging = logging;
    }

    Ok(())
}

/// Load configuration from environment variables
fn load_from_env(config: &mut ServiceConfig) -> Result<()> {
    if let Ok(level) = std::env::var("BOOK_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Ok(format) = std::env::var("BOOK_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Ok(timeout) = std::env::var("BOOK_SHUTDOWN_TIMEOUT_SECS") {
        config.service.shutdown_timeout_secs =
            timeout.parse().context("Invalid BOOK_SHUTDOWN_TIMEOUT_SECS")?;
    }

    if let Ok(interval) = std::env::var("BOOK_HEALTH_CHECK_INTERVAL_SECS") {
        config.service.health_check_interval_secs =
            interval.parse().context("Invalid BOOK_HEALTH_CHECK_INTERVAL_SECS")?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.book.validate().context("Invalid book configuration")?;

    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.service.health_check_interval_secs == 0 {
        return Err(anyhow::anyhow!("Health check interval must be greater than zero"));
    }

    Ok(())
}
