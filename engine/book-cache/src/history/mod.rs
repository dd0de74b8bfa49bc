//! Relational store access: reference data and closed-position history

mod memory;
mod postgres;

pub use memory::MemoryHistory;
pub use postgres::PgHistory;

use crate::error::Result;
use crate::types::{ClosedPosition, Instrument};
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Keyset-paginated history query.
///
/// Rows have `closed` within `[from, till]` and `id >= start_id`, ordered by
/// id ascending, at most `limit` rows. An empty `account_ids` means no
/// account restriction. The next page starts at the last returned id + 1.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub account_ids: Vec<i64>,
    pub from: NaiveDateTime,
    pub till: NaiveDateTime,
    pub start_id: i64,
    pub limit: i64,
}

impl HistoryQuery {
    /// Query for the page following `page`, or None when `page` was the last
    pub fn next_page(&self, page: &[ClosedPosition]) -> Option<Self> {
        if page.is_empty() || (page.len() as i64) < self.limit {
            return None;
        }

        let last = page.last()?;
        Some(Self { start_id: last.id + 1, ..self.clone() })
    }
}

/// Read-only access to the relational store
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All instruments, ordered by symbol name
    async fn select_pairs(&self) -> Result<Vec<Instrument>>;

    /// One page of closed positions
    async fn select_history(&self, query: &HistoryQuery) -> Result<Vec<ClosedPosition>>;

    /// Round-trip check used by health checks
    async fn ping(&self) -> Result<()>;
}
