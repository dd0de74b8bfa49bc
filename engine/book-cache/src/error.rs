//! Error types for the book cache

use thiserror::Error;

/// Result type for book cache operations
pub type Result<T> = std::result::Result<T, BookError>;

/// Errors that can occur while mirroring or querying the book
#[derive(Error, Debug)]
pub enum BookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bucket {bucket} not found")]
    BucketNotFound { bucket: String },

    #[error("Watch on {pattern} closed before the snapshot was loaded")]
    WatchClosed { pattern: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}
