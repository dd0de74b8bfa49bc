//! Watch ingestors: apply bucket change streams to the caches
//!
//! Accounts and trades use deliberately different write policies. A repeated
//! account event only refreshes balance, trader and currency; a repeated
//! trade event replaces the whole cached position.

use crate::store::{AccountStore, PositionStore};
use crate::types::{Account, AccountRecord, TradeRecord};
use crate::watch::{WatchEvent, WatchStream};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Key pattern watched for accounts
pub const ACCOUNT_PATTERN: &str = "account.*";

/// Key pattern watched for open trades
pub const TRADE_PATTERN: &str = "trade.*";

/// Counters reported when a replay completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Put events applied so far
    pub applied: u64,
    /// Events skipped because their payload or key could not be decoded
    pub skipped: u64,
    /// Delete events applied so far
    pub deleted: u64,
}

/// Applies events of one key family to its cache
pub trait WatchHandler: Send + 'static {
    /// Label used in logs
    fn family(&self) -> &'static str;

    /// Apply a put. Returns false when the event was skipped.
    fn on_put(&self, key: &str, value: &[u8]) -> bool;

    /// Apply a delete. Returns false when the event was ignored.
    fn on_delete(&self, key: &str) -> bool;
}

/// Inserts new accounts and refreshes the mutable fields of known ones
pub struct AccountIngestor {
    accounts: Arc<AccountStore>,
}

impl AccountIngestor {
    pub fn new(accounts: Arc<AccountStore>) -> Self {
        Self { accounts }
    }
}

impl WatchHandler for AccountIngestor {
    fn family(&self) -> &'static str {
        "accounts"
    }

    fn on_put(&self, key: &str, value: &[u8]) -> bool {
        let record: AccountRecord = match serde_json::from_slice(value) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping account {}: {} ({})", key, e, String::from_utf8_lossy(value));
                return false;
            }
        };

        let account = Account::from(record.clone());
        self.accounts.load_or_insert_with(record.id, account, |cached, _| {
            cached.refresh_from(&record);
        });

        true
    }

    fn on_delete(&self, key: &str) -> bool {
        // Accounts are never removed from the mirror
        debug!("Ignoring delete of {}", key);
        false
    }
}

/// Replaces cached positions on put and removes them on delete
pub struct PositionIngestor {
    positions: Arc<PositionStore>,
}

impl PositionIngestor {
    pub fn new(positions: Arc<PositionStore>) -> Self {
        Self { positions }
    }
}

impl WatchHandler for PositionIngestor {
    fn family(&self) -> &'static str {
        "trades"
    }

    fn on_put(&self, key: &str, value: &[u8]) -> bool {
        let record: TradeRecord = match serde_json::from_slice(value) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping trade {}: {} ({})", key, e, String::from_utf8_lossy(value));
                return false;
            }
        };

        let opened = record.opened.clone();
        let position = match record.into_position() {
            Ok(position) => position,
            Err(e) => {
                warn!("Skipping trade {}: bad opened {:?}: {}", key, opened, e);
                return false;
            }
        };

        self.positions.store(position.id, position);
        true
    }

    fn on_delete(&self, key: &str) -> bool {
        match parse_key_id(key) {
            Some(id) => {
                self.positions.remove(id);
                true
            }
            None => {
                warn!("Skipping delete with malformed key {}", key);
                false
            }
        }
    }
}

/// Parse the id from a `<entity>.<id>` key
pub fn parse_key_id(key: &str) -> Option<i64> {
    let (_, id) = key.split_once('.')?;
    id.parse().ok()
}

/// Drive a watch stream into `handler` until the stream ends or `shutdown` fires.
///
/// `loaded` is completed once, when the replay sentinel arrives. If the stream
/// ends first the sender is dropped, which the receiving side sees as an error.
pub async fn run_watch<H: WatchHandler>(
    mut stream: WatchStream,
    handler: H,
    loaded: oneshot::Sender<IngestStats>,
    mut shutdown: watch::Receiver<bool>,
) -> IngestStats {
    let mut loaded = Some(loaded);
    let mut stats = IngestStats::default();

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => {
                info!("{} watch stopping", handler.family());
                break;
            }
            event = stream.next() => event,
        };

        match event {
            Some(WatchEvent::Put { key, value }) => {
                if handler.on_put(&key, &value) {
                    stats.applied += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Some(WatchEvent::Delete { key }) => {
                if handler.on_delete(&key) {
                    stats.deleted += 1;
                } else {
                    stats.skipped += 1;
                }
            }
            Some(WatchEvent::EndOfReplay) => match loaded.take() {
                Some(tx) => {
                    info!("{} loading completed: {}", handler.family(), stats.applied);
                    let _ = tx.send(stats);
                }
                None => debug!("{} watch repeated the replay marker", handler.family()),
            },
            None => {
                warn!("{} watch stream closed", handler.family());
                break;
            }
        }
    }

    stats
}
