//! Redis-backed bucket
//!
//! Layout: current values live in the hash named after the bucket, field =
//! key. Every change is published on `<bucket>:<key>`; an empty payload marks
//! a delete. Redis drops a hash with its last field, so the bucket exists
//! when its marker key `<bucket>:meta` exists. The writer creates the marker.
//!
//! A watch pattern-subscribes before reading the hash. A change published
//! between the two is part of the replay and is delivered again after the
//! sentinel, so readers may briefly see the older value until it is
//! re-applied. Both copies arrive in publish order and the cache converges.

use super::{key_matches, KeyValueStore, WatchEvent, WatchStream};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use redis::{AsyncCommands, Client, Msg};
use std::collections::BTreeMap;
use tracing::debug;

/// Bucket stored in Redis
pub struct RedisBucket {
    client: Client,
    name: String,
}

impl RedisBucket {
    /// Create a bucket handle; no connection is made until it is used
    pub fn open(url: &str, name: impl Into<String>) -> Result<Self> {
        Ok(Self { client: Client::open(url)?, name: name.into() })
    }

    fn channel(&self, pattern: &str) -> String {
        format!("{}:{}", self.name, pattern)
    }
}

fn meta_key(bucket: &str) -> String {
    format!("{}:meta", bucket)
}

/// Translate a change notification into a watch event
fn decode_change(channel_prefix: &str, msg: &Msg) -> Option<WatchEvent> {
    let key = msg.get_channel_name().strip_prefix(channel_prefix)?.to_string();
    let payload = msg.get_payload_bytes();

    if payload.is_empty() {
        Some(WatchEvent::Delete { key })
    } else {
        Some(WatchEvent::Put { key, value: payload.to_vec() })
    }
}

#[async_trait]
impl KeyValueStore for RedisBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self) -> Result<bool> {
        let mut conn = self.client.get_async_connection().await?;
        let exists: bool = conn.exists(meta_key(&self.name)).await?;
        Ok(exists)
    }

    async fn watch(&self, pattern: &str) -> Result<WatchStream> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.psubscribe(self.channel(pattern)).await?;

        let mut conn = self.client.get_async_connection().await?;
        let entries: BTreeMap<String, Vec<u8>> = conn.hgetall(&self.name).await?;

        let replay: Vec<WatchEvent> = entries
            .into_iter()
            .filter(|(key, _)| key_matches(pattern, key))
            .map(|(key, value)| WatchEvent::Put { key, value })
            .collect();

        debug!("Watch {} on {}: replaying {} keys", pattern, self.name, replay.len());

        let channel_prefix = self.channel("");
        let live = pubsub.into_on_message().filter_map(move |msg| {
            let event = decode_change(&channel_prefix, &msg);
            async move { event }
        });

        Ok(stream::iter(replay)
            .chain(stream::once(async { WatchEvent::EndOfReplay }))
            .chain(live)
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_key_is_outside_the_data_hash() {
        let bucket = RedisBucket::open("redis://127.0.0.1/", "KV_book").unwrap();
        assert_eq!(meta_key(bucket.bucket()), "KV_book:meta");
        assert_ne!(meta_key(bucket.bucket()), bucket.bucket());
        assert!(!key_matches("account.*", "meta"));
        assert!(!key_matches("trade.*", "meta"));
    }
}
