//! Book Mirror - live cache of a trading book
//!
//! This crate keeps accounts and open positions in memory, fed by an ordered
//! key-value watch stream, patches running profit/loss from a valuation
//! channel, and serves filtered queries over the caches and over the closed
//! position history held in Postgres.

pub mod config;
pub mod error;
pub mod history;
pub mod ingestor;
pub mod query;
pub mod reference;
pub mod service;
pub mod store;
pub mod types;
pub mod valuation;
pub mod watch;

pub use config::{BookConfig, DatabaseConfig, RedisConfig};
pub use error::{BookError, Result};
pub use service::{BookMirrorService, LoadStats, ServiceHealth};
pub use types::{Account, ClosedPosition, Instrument, Position};

/// Re-export commonly used types
pub use history::{HistoryQuery, HistoryStore, MemoryHistory, PgHistory};
pub use valuation::{MemoryValuationFeed, RedisValuationFeed, ValuationFeed};
pub use watch::{KeyValueStore, MemoryBucket, RedisBucket, WatchEvent};
