//! Mark-to-market updates from the valuation channel
//!
//! The channel is best effort: messages may be lost or repeated. Applying a
//! mark overwrites the cached profit/loss, so repeats are harmless and a lost
//! message is corrected by the next one.

mod memory;
mod redis_feed;

pub use memory::MemoryValuationFeed;
pub use redis_feed::RedisValuationFeed;

use crate::error::Result;
use crate::store::PositionStore;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Event kind carrying position marks
pub const ACCOUNT_STATE_EVENT: &str = "account-state";

/// Raw valuation payloads
pub type ValuationStream = BoxStream<'static, Vec<u8>>;

/// Source of valuation messages
#[async_trait]
pub trait ValuationFeed: Send + Sync {
    async fn subscribe(&self) -> Result<ValuationStream>;
}

/// Valuation message envelope
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValuationMessage {
    pub m: ValuationBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValuationBody {
    pub event: String,
    pub payload: ValuationPayload,
}

/// Per-position marks; account-level figures in the payload are not mirrored
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValuationPayload {
    #[serde(rename = "o")]
    pub marks: Vec<PositionMark>,
}

/// New profit/loss of one position
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionMark {
    #[serde(rename = "t")]
    pub position_id: i64,
    #[serde(rename = "p", default)]
    pub profit_loss: f64,
}

/// Patches profit/loss of cached positions
#[derive(Clone)]
pub struct MarkToMarketApplier {
    positions: Arc<PositionStore>,
}

impl MarkToMarketApplier {
    pub fn new(positions: Arc<PositionStore>) -> Self {
        Self { positions }
    }

    /// Apply one raw message, returning the number of positions patched.
    /// Undecodable messages and other event kinds patch nothing.
    pub fn apply_message(&self, raw: &[u8]) -> usize {
        let message: ValuationMessage = match serde_json::from_slice(raw) {
            Ok(message) => message,
            Err(_) => return 0,
        };

        if message.m.event != ACCOUNT_STATE_EVENT {
            return 0;
        }

        self.apply_marks(&message.m.payload.marks)
    }

    /// Overwrite profit/loss for every cached position in `marks`.
    /// Marks for unknown positions are dropped.
    pub fn apply_marks(&self, marks: &[PositionMark]) -> usize {
        marks
            .iter()
            .filter(|mark| {
                self.positions.update(mark.position_id, |position| {
                    position.profit_loss = mark.profit_loss;
                })
            })
            .count()
    }

    /// Consume `stream` until it ends or `shutdown` fires
    pub async fn run(self, mut stream: ValuationStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            let raw = tokio::select! {
                _ = shutdown.changed() => {
                    info!("valuation subscription stopping");
                    break;
                }
                raw = stream.next() => raw,
            };

            match raw {
                Some(raw) => {
                    let patched = self.apply_message(&raw);
                    debug!("valuation message patched {} positions", patched);
                }
                None => {
                    info!("valuation stream closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeRecord;

    fn cached_positions(ids: &[i64]) -> Arc<PositionStore> {
        let positions = Arc::new(PositionStore::new());
        for &id in ids {
            let record = TradeRecord {
                id,
                account: 1,
                pair: 2,
                amount: 1.5,
                price: 1.2345,
                side: "buy".to_string(),
                opened: "2024-01-01T00:00:00".to_string(),
                ..Default::default()
            };
            positions.store(id, record.into_position().unwrap());
        }
        positions
    }

    #[test]
    fn test_account_state_patches_profit_loss() {
        let positions = cached_positions(&[5]);
        let applier = MarkToMarketApplier::new(positions.clone());

        let raw = br#"{"m":{"event":"account-state","payload":{"o":[{"t":5,"p":42.0}]}}}"#;
        assert_eq!(applier.apply_message(raw), 1);

        let position = positions.get(5).unwrap();
        assert_eq!(position.profit_loss, 42.0);
        assert_eq!(position.amount, 1.5);
        assert_eq!(position.open_price, 1.2345);
    }

    #[test]
    fn test_other_events_are_ignored() {
        let positions = cached_positions(&[5]);
        let applier = MarkToMarketApplier::new(positions.clone());

        let raw = br#"{"m":{"event":"quote","payload":{"o":[{"t":5,"p":42.0}]}}}"#;
        assert_eq!(applier.apply_message(raw), 0);
        assert_eq!(applier.apply_message(b"garbage"), 0);
        assert_eq!(positions.get(5).unwrap().profit_loss, 0.0);
    }

    #[test]
    fn test_unknown_positions_are_dropped() {
        let positions = cached_positions(&[5]);
        let applier = MarkToMarketApplier::new(positions.clone());

        let raw = br#"{"d":false,"u":[1],"m":{"event":"account-state","payload":{"a":1,"b":10.0,"o":[{"t":5,"p":-3.5},{"t":6,"p":9.0}]}}}"#;
        assert_eq!(applier.apply_message(raw), 1);
        assert!(!positions.contains(6));
        assert_eq!(positions.get(5).unwrap().profit_loss, -3.5);
    }

    #[test]
    fn test_repeated_message_is_idempotent() {
        let positions = cached_positions(&[1, 2]);
        let applier = MarkToMarketApplier::new(positions.clone());

        let marks = [
            PositionMark { position_id: 1, profit_loss: 10.0 },
            PositionMark { position_id: 2, profit_loss: -1.0 },
        ];
        applier.apply_marks(&marks);
        let mut first = positions.snapshot();
        applier.apply_marks(&marks);

        let mut second = positions.snapshot();
        first.sort_by_key(|p| p.id);
        second.sort_by_key(|p| p.id);
        assert_eq!(first, second);
    }
}
