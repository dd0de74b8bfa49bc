//! In-process bucket, used by tests and local runs without Redis

use super::{key_matches, KeyValueStore, WatchEvent, WatchStream};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
struct BucketState {
    entries: BTreeMap<String, Vec<u8>>,
    watchers: Vec<(String, mpsc::UnboundedSender<WatchEvent>)>,
}

/// Bucket held in memory, with the same replay-then-tail semantics as `RedisBucket`
pub struct MemoryBucket {
    name: String,
    exists: bool,
    state: Mutex<BucketState>,
}

impl MemoryBucket {
    /// Create an empty, existing bucket
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), exists: true, state: Mutex::new(BucketState::default()) }
    }

    /// Create a handle to a bucket that was never provisioned
    pub fn missing(name: impl Into<String>) -> Self {
        Self { exists: false, ..Self::new(name) }
    }

    /// Store a value and notify matching watchers
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        let mut state = self.state.lock().await;
        state.entries.insert(key.to_string(), value.clone());
        notify(&mut state, key, WatchEvent::Put { key: key.to_string(), value });
    }

    /// Delete a key and notify matching watchers
    pub async fn delete(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.entries.remove(key);
        notify(&mut state, key, WatchEvent::Delete { key: key.to_string() });
    }

    /// Number of live watchers
    pub async fn watcher_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.watchers.retain(|(_, tx)| !tx.is_closed());
        state.watchers.len()
    }
}

fn notify(state: &mut BucketState, key: &str, event: WatchEvent) {
    state.watchers.retain(|(pattern, tx)| {
        if !key_matches(pattern, key) {
            return !tx.is_closed();
        }
        tx.send(event.clone()).is_ok()
    });
}

#[async_trait]
impl KeyValueStore for MemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.exists)
    }

    async fn watch(&self, pattern: &str) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Snapshot and registration happen under one lock, so nothing falls between them
        let replay: Vec<WatchEvent> = {
            let mut state = self.state.lock().await;
            state.watchers.push((pattern.to_string(), tx));
            state
                .entries
                .iter()
                .filter(|(key, _)| key_matches(pattern, key))
                .map(|(key, value)| WatchEvent::Put { key: key.clone(), value: value.clone() })
                .collect()
        };

        let live = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(stream::iter(replay)
            .chain(stream::once(async { WatchEvent::EndOfReplay }))
            .chain(live)
            .boxed())
    }
}
