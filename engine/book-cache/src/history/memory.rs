//! In-process history store with the same paging rules as the Postgres store

use super::{HistoryQuery, HistoryStore};
use crate::error::{BookError, Result};
use crate::types::{ClosedPosition, Instrument};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// History held in memory
#[derive(Default)]
pub struct MemoryHistory {
    instruments: Vec<Instrument>,
    closed: Vec<ClosedPosition>,
    unavailable: AtomicBool,
    queries: Mutex<Vec<HistoryQuery>>,
}

impl MemoryHistory {
    pub fn new(instruments: Vec<Instrument>, closed: Vec<ClosedPosition>) -> Self {
        Self { instruments, closed, ..Default::default() }
    }

    /// Make every call fail, as an unreachable database would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<HistoryQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BookError::Internal { message: "history store unavailable".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn select_pairs(&self) -> Result<Vec<Instrument>> {
        self.check_available()?;

        let mut instruments = self.instruments.clone();
        instruments.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(instruments)
    }

    async fn select_history(&self, query: &HistoryQuery) -> Result<Vec<ClosedPosition>> {
        self.check_available()?;

        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }

        let mut rows: Vec<ClosedPosition> = self
            .closed
            .iter()
            .filter(|row| row.closed >= query.from && row.closed <= query.till)
            .filter(|row| row.id >= query.start_id)
            .filter(|row| query.account_ids.is_empty() || query.account_ids.contains(&row.account_id))
            .cloned()
            .collect();

        rows.sort_by_key(|row| row.id);
        rows.truncate(query.limit.max(0) as usize);
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
