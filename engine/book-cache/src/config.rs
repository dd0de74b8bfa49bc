//! Configuration for the book cache

use crate::error::{BookError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Maximum lifetime of a pooled connection in milliseconds
    pub max_lifetime_ms: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Book cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    /// Namespace shared by the relational schema, the bucket and the valuation channel
    pub schema: String,
    /// Log history query timings
    pub debug: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/book".to_string(),
            max_connections: 10,
            min_connections: 1,
            max_lifetime_ms: 1000,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: "redis://localhost:6379".to_string() }
    }
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            schema: "book".to_string(),
            debug: false,
        }
    }
}

impl DatabaseConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }
}

impl BookConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| BookError::InvalidConfig { message: "DATABASE_URL not set".to_string() })?;

        let redis_url = std::env::var("REDIS_URL")
            .map_err(|_| BookError::InvalidConfig { message: "REDIS_URL not set".to_string() })?;

        let schema = std::env::var("BOOK_SCHEMA")
            .map_err(|_| BookError::InvalidConfig { message: "BOOK_SCHEMA not set".to_string() })?;

        let defaults = DatabaseConfig::default();

        let max_connections = parse_env("BOOK_DB_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections = parse_env("BOOK_DB_MIN_CONNECTIONS", defaults.min_connections)?;
        let max_lifetime_ms = parse_env("BOOK_DB_MAX_LIFETIME_MS", defaults.max_lifetime_ms)?;
        let debug = parse_env("BOOK_DEBUG", false)?;

        let config = Self {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
                min_connections,
                max_lifetime_ms,
            },
            redis: RedisConfig { url: redis_url },
            schema,
            debug,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at connect or query time
    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty()
            || !self.schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(BookError::InvalidConfig {
                message: format!("Invalid schema name: {:?}", self.schema),
            });
        }

        if self.database.max_connections == 0 {
            return Err(BookError::InvalidConfig {
                message: "max_connections must be greater than zero".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(BookError::InvalidConfig {
                message: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    self.database.min_connections, self.database.max_connections
                ),
            });
        }

        Ok(())
    }

    /// Name of the key-value bucket holding accounts and trades
    pub fn bucket_name(&self) -> String {
        format!("KV_{}", self.schema)
    }

    /// Name of the pub/sub channel carrying valuation messages
    pub fn valuation_channel(&self) -> &str {
        &self.schema
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| BookError::InvalidConfig { message: format!("Invalid {}", name) }),
        Err(_) => Ok(default),
    }
}
