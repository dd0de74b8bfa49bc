//! In-process valuation feed

use super::{ValuationFeed, ValuationStream};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;

/// Broadcast-backed feed; like real pub/sub, messages published with no
/// subscriber are lost
pub struct MemoryValuationFeed {
    tx: broadcast::Sender<Vec<u8>>,
}

impl MemoryValuationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish a message, returning how many subscribers received it
    pub fn publish(&self, message: impl Into<Vec<u8>>) -> usize {
        self.tx.send(message.into()).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MemoryValuationFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValuationFeed for MemoryValuationFeed {
    async fn subscribe(&self) -> Result<ValuationStream> {
        let rx = self.tx.subscribe();

        Ok(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    // Lagging loses messages, which this channel tolerates
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}
