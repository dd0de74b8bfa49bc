//! Valuation feed over Redis pub/sub

use super::{ValuationFeed, ValuationStream};
use crate::error::Result;
use async_trait::async_trait;
use futures::StreamExt;
use redis::Client;

/// Subscribes to the valuation channel on Redis
pub struct RedisValuationFeed {
    client: Client,
    channel: String,
}

impl RedisValuationFeed {
    pub fn open(url: &str, channel: impl Into<String>) -> Result<Self> {
        Ok(Self { client: Client::open(url)?, channel: channel.into() })
    }
}

#[async_trait]
impl ValuationFeed for RedisValuationFeed {
    async fn subscribe(&self) -> Result<ValuationStream> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&self.channel).await?;

        // Dropping the stream closes the connection, which ends the subscription
        Ok(pubsub.into_on_message().map(|msg| msg.get_payload_bytes().to_vec()).boxed())
    }
}
