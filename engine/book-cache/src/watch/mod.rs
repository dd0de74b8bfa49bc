//! Ordered key-value change streams
//!
//! A watch first replays the current value of every matching key as a put,
//! then yields `EndOfReplay` exactly once, then delivers live puts and
//! deletes until the stream is dropped.

mod memory;
mod redis_bucket;

pub use memory::MemoryBucket;
pub use redis_bucket::RedisBucket;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Single event of a watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    /// Every key that existed when the watch opened has been replayed
    EndOfReplay,
}

/// Ordered stream of watch events
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Bucket that can be watched for changes
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Name of the backing bucket
    fn bucket(&self) -> &str;

    /// Whether the backing bucket exists
    async fn bucket_exists(&self) -> Result<bool>;

    /// Watch every key matching `pattern` (`<prefix>*` or an exact key)
    async fn watch(&self, pattern: &str) -> Result<WatchStream>;
}

/// Check a key against a watch pattern
pub(crate) fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matches() {
        assert!(key_matches("account.*", "account.42"));
        assert!(!key_matches("account.*", "trade.42"));
        assert!(key_matches("trade.5", "trade.5"));
        assert!(!key_matches("trade.5", "trade.50"));
    }
}
