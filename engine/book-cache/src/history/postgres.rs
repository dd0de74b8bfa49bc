//! Postgres-backed history store
//!
//! Every column is cast explicitly and read as `Option<_>`, so integer width
//! differences and NULLs in the tables never fail a scan; NULL collapses to
//! the type's zero value.

use super::{HistoryQuery, HistoryStore};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::types::{ClosedPosition, Instrument};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{debug, info};

const HISTORY_COLUMNS: &str = "
    trade_id::int8 as trade_id,
    prnt_trade_id::int8 as prnt_trade_id,
    acct_id::int8 as acct_id,
    pair_id::int8 as pair_id,
    lot_size::float8 as lot_size,
    open_lots::float8 as open_lots,
    close_lots::float8 as close_lots,
    sellbuy_ind::text as sellbuy_ind,
    open_date::timestamp as open_date,
    close_date::timestamp as close_date,
    open_rate::float8 as open_rate,
    close_rate::float8 as close_rate,
    profit_loss::float8 as profit_loss,
    swaps::float8 as swaps,
    comm::float8 as comm,
    commentary::text as commentary,
    position_id::int8 as position_id";

#[derive(Debug, sqlx::FromRow)]
struct PairRow {
    id: Option<i64>,
    name: Option<String>,
    market: Option<String>,
    base: Option<String>,
    contract_size: Option<f64>,
    precision: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    trade_id: Option<i64>,
    prnt_trade_id: Option<i64>,
    acct_id: Option<i64>,
    pair_id: Option<i64>,
    lot_size: Option<f64>,
    open_lots: Option<f64>,
    close_lots: Option<f64>,
    sellbuy_ind: Option<String>,
    open_date: Option<NaiveDateTime>,
    close_date: Option<NaiveDateTime>,
    open_rate: Option<f64>,
    close_rate: Option<f64>,
    profit_loss: Option<f64>,
    swaps: Option<f64>,
    comm: Option<f64>,
    commentary: Option<String>,
    position_id: Option<i64>,
}

impl From<PairRow> for Instrument {
    fn from(row: PairRow) -> Self {
        Self {
            id: row.id.unwrap_or_default(),
            symbol: row.name.unwrap_or_default(),
            market: row.market.unwrap_or_default(),
            quote_currency: row.base.unwrap_or_default(),
            min_trade_size: 0.0,
            precision: row.precision.unwrap_or_default(),
            contract_size: row.contract_size.unwrap_or_default(),
            bid: 0.0,
            ask: 0.0,
            quoted_at: None,
        }
    }
}

impl From<HistoryRow> for ClosedPosition {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.trade_id.unwrap_or_default(),
            parent_id: row.prnt_trade_id,
            account_id: row.acct_id.unwrap_or_default(),
            instrument_id: row.pair_id.unwrap_or_default(),
            contract_size: row.lot_size.unwrap_or_default(),
            open_lots: row.open_lots.unwrap_or_default(),
            close_lots: row.close_lots.unwrap_or_default(),
            open_price: row.open_rate.unwrap_or_default(),
            close_price: row.close_rate.unwrap_or_default(),
            side: row.sellbuy_ind.unwrap_or_default(),
            fee: row.comm.unwrap_or_default(),
            swap: row.swaps.unwrap_or_default(),
            profit_loss: row.profit_loss.unwrap_or_default(),
            opened: row.open_date.unwrap_or_default(),
            closed: row.close_date.unwrap_or_default(),
            commentary: row.commentary.unwrap_or_default(),
            position_id: row.position_id.unwrap_or_default(),
        }
    }
}

/// History store over a small, short-lived connection pool
pub struct PgHistory {
    pool: PgPool,
    schema: String,
    debug: bool,
}

impl PgHistory {
    /// Connect the pool; fails when the database is unreachable
    pub async fn connect(config: &DatabaseConfig, schema: &str, debug: bool) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime())
            .connect(&config.url)
            .await?;

        info!(
            "Connected history pool (max {} connections, lifetime {:?})",
            config.max_connections,
            config.max_lifetime()
        );

        Ok(Self::with_pool(pool, schema, debug))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool, schema: &str, debug: bool) -> Self {
        Self { pool, schema: schema.to_string(), debug }
    }

    fn history_sql(&self, by_account: bool) -> String {
        if by_account {
            format!(
                "select {} from {}.trade_history th
                 where close_date between $1 and $2
                   and acct_id = any($3::int8[])
                   and trade_id >= $4
                 order by trade_id
                 limit $5",
                HISTORY_COLUMNS, self.schema
            )
        } else {
            format!(
                "select {} from {}.trade_history th
                 where close_date between $1 and $2
                   and trade_id >= $3
                 order by trade_id
                 limit $4",
                HISTORY_COLUMNS, self.schema
            )
        }
    }
}

#[async_trait]
impl HistoryStore for PgHistory {
    async fn select_pairs(&self) -> Result<Vec<Instrument>> {
        let sql = format!(
            "select id::int8 as id,
                    name::text as name,
                    market::text as market,
                    base::text as base,
                    contract_size::float8 as contract_size,
                    precision::float8 as precision
             from {}.pairs
             order by name",
            self.schema
        );

        let rows = sqlx::query_as::<_, PairRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Instrument::from).collect())
    }

    async fn select_history(&self, query: &HistoryQuery) -> Result<Vec<ClosedPosition>> {
        let started = Instant::now();
        let by_account = !query.account_ids.is_empty();
        let sql = self.history_sql(by_account);

        let rows = if by_account {
            sqlx::query_as::<_, HistoryRow>(&sql)
                .bind(query.from)
                .bind(query.till)
                .bind(query.account_ids.as_slice())
                .bind(query.start_id)
                .bind(query.limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, HistoryRow>(&sql)
                .bind(query.from)
                .bind(query.till)
                .bind(query.start_id)
                .bind(query.limit)
                .fetch_all(&self.pool)
                .await?
        };

        if self.debug {
            debug!(
                "select_history (accounts: {}): {} rows in {:?}",
                query.account_ids.len(),
                rows.len(),
                started.elapsed()
            );
        }

        Ok(rows.into_iter().map(ClosedPosition::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("select 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_history_row_decodes_to_zero_values() {
        let row = HistoryRow {
            trade_id: Some(10),
            prnt_trade_id: None,
            acct_id: Some(3),
            pair_id: None,
            lot_size: None,
            open_lots: Some(1.0),
            close_lots: Some(1.0),
            sellbuy_ind: None,
            open_date: None,
            close_date: None,
            open_rate: None,
            close_rate: None,
            profit_loss: None,
            swaps: None,
            comm: None,
            commentary: None,
            position_id: None,
        };

        let closed = ClosedPosition::from(row);
        assert_eq!(closed.id, 10);
        assert_eq!(closed.parent_id, None);
        assert_eq!(closed.account_id, 3);
        assert_eq!(closed.fee, 0.0);
        assert_eq!(closed.swap, 0.0);
        assert_eq!(closed.side, "");
        assert_eq!(closed.closed, NaiveDateTime::default());
    }

    #[test]
    fn test_pair_row_maps_base_to_quote_currency() {
        let row = PairRow {
            id: Some(2),
            name: Some("EURUSD".to_string()),
            market: Some("FX".to_string()),
            base: Some("USD".to_string()),
            contract_size: Some(100000.0),
            precision: None,
        };

        let instrument = Instrument::from(row);
        assert_eq!(instrument.symbol, "EURUSD");
        assert_eq!(instrument.quote_currency, "USD");
        assert_eq!(instrument.precision, 0.0);
    }
}
