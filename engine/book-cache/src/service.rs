//! Book mirror service: startup ordering, background workers, queries

use crate::config::BookConfig;
use crate::error::{BookError, Result};
use crate::history::{HistoryStore, PgHistory};
use crate::ingestor::{
    run_watch, AccountIngestor, IngestStats, PositionIngestor, WatchHandler, ACCOUNT_PATTERN,
    TRADE_PATTERN,
};
use crate::query::{self, ClosedPositionFilter};
use crate::reference::ReferenceCache;
use crate::store::{AccountStore, PositionStore};
use crate::types::{Account, ClosedPosition, Instrument, Position};
use crate::valuation::{MarkToMarketApplier, RedisValuationFeed, ValuationFeed};
use crate::watch::{KeyValueStore, RedisBucket};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Replay counters captured when each snapshot finished loading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub accounts: IngestStats,
    pub trades: IngestStats,
}

/// Service health status
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceHealth {
    Healthy,
    /// A background worker has stopped; the named workers are no longer running
    Degraded(Vec<&'static str>),
    Unhealthy(String),
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceHealth::Healthy)
    }
}

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// In-memory mirror of accounts and open positions
pub struct BookMirrorService {
    config: BookConfig,
    reference: Arc<ReferenceCache>,
    accounts: Arc<AccountStore>,
    positions: Arc<PositionStore>,
    history: Arc<dyn HistoryStore>,
    cache_time: DateTime<Utc>,
    load_stats: LoadStats,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<Worker>>,
}

impl BookMirrorService {
    /// Connect to Postgres and Redis, then start the service
    pub async fn connect(config: BookConfig) -> Result<Self> {
        config.validate()?;

        let history = PgHistory::connect(&config.database, &config.schema, config.debug).await?;
        let bucket = RedisBucket::open(&config.redis.url, config.bucket_name())?;
        let feed = RedisValuationFeed::open(&config.redis.url, config.valuation_channel())?;

        Self::start(config, Arc::new(history), Arc::new(bucket), Arc::new(feed)).await
    }

    /// Start the service over the given collaborators.
    ///
    /// Loads reference data, then blocks until the account snapshot and then
    /// the trade snapshot are fully replayed, then subscribes to valuations
    /// without waiting. Any failure along the way aborts startup.
    pub async fn start(
        config: BookConfig,
        history: Arc<dyn HistoryStore>,
        bucket: Arc<dyn KeyValueStore>,
        feed: Arc<dyn ValuationFeed>,
    ) -> Result<Self> {
        let cache_time = Utc::now();

        let instruments = history.select_pairs().await?;
        let reference = Arc::new(ReferenceCache::new(instruments));
        info!("Loaded {} instruments", reference.len());

        // Dropping the sender stops every worker, including on a failed startup
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accounts = Arc::new(AccountStore::new());
        let positions = Arc::new(PositionStore::new());
        let mut workers = Vec::new();

        let (worker, account_stats) = spawn_watch(
            bucket.as_ref(),
            ACCOUNT_PATTERN,
            AccountIngestor::new(accounts.clone()),
            shutdown_rx.clone(),
        )
        .await?;
        workers.push(worker);

        let (worker, trade_stats) = spawn_watch(
            bucket.as_ref(),
            TRADE_PATTERN,
            PositionIngestor::new(positions.clone()),
            shutdown_rx.clone(),
        )
        .await?;
        workers.push(worker);

        let valuations = feed.subscribe().await?;
        let applier = MarkToMarketApplier::new(positions.clone());
        workers.push(Worker {
            name: "valuations",
            handle: tokio::spawn(applier.run(valuations, shutdown_rx)),
        });

        info!(
            "Book mirror ready: {} accounts, {} positions",
            accounts.len(),
            positions.len()
        );

        Ok(Self {
            config,
            reference,
            accounts,
            positions,
            history,
            cache_time,
            load_stats: LoadStats { accounts: account_stats, trades: trade_stats },
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }

    /// Open positions, restricted to one trader's accounts when `trader_id` is non-zero
    pub fn get_positions(&self, trader_id: i64) -> Vec<Position> {
        query::open_positions(&self.accounts, &self.positions, trader_id)
    }

    /// Accounts matching the non-zero filters
    pub fn get_accounts(&self, trader_id: i64, account_id: i64) -> Vec<Account> {
        query::filter_accounts(&self.accounts, trader_id, account_id)
    }

    /// One page of closed positions with `id >= start_id`, closed within `[from, till]`
    pub async fn get_closed_positions(
        &self,
        trader_id: i64,
        account_id: i64,
        start_id: i64,
        limit: i64,
        from: NaiveDateTime,
        till: NaiveDateTime,
    ) -> Result<Vec<ClosedPosition>> {
        let filter = ClosedPositionFilter { trader_id, account_id, start_id, limit, from, till };
        query::closed_positions(&self.accounts, self.history.as_ref(), &filter).await
    }

    pub fn get_instrument(&self, id: i64) -> Option<&Instrument> {
        self.reference.get(id)
    }

    pub fn get_instrument_by_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.reference.get_by_symbol(symbol)
    }

    pub fn instruments(&self) -> &[Instrument] {
        self.reference.instruments()
    }

    /// When the caches started loading
    pub fn cache_time(&self) -> DateTime<Utc> {
        self.cache_time
    }

    pub fn load_stats(&self) -> LoadStats {
        self.load_stats
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Check the relational store and the background workers
    pub async fn health_check(&self) -> ServiceHealth {
        if *self.shutdown_tx.borrow() {
            return ServiceHealth::Unhealthy("shut down".to_string());
        }

        if let Err(e) = self.history.ping().await {
            return ServiceHealth::Unhealthy(e.to_string());
        }

        let workers = self.workers.lock().await;
        let stopped: Vec<&'static str> = workers
            .iter()
            .filter(|worker| worker.handle.is_finished())
            .map(|worker| worker.name)
            .collect();

        if stopped.is_empty() {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Degraded(stopped)
        }
    }

    /// Stop every worker, dropping the watch and valuation subscriptions
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down book mirror...");
        let _ = self.shutdown_tx.send(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.handle.await {
                error!("{} worker failed: {}", worker.name, e);
            } else {
                info!("{} worker stopped", worker.name);
            }
        }

        Ok(())
    }
}

/// Spawn a watch worker and wait for its snapshot to finish loading
async fn spawn_watch<H: WatchHandler>(
    bucket: &dyn KeyValueStore,
    pattern: &str,
    handler: H,
    shutdown: watch::Receiver<bool>,
) -> Result<(Worker, IngestStats)> {
    if !bucket.bucket_exists().await? {
        error!("bucket {} not found", bucket.bucket());
        return Err(BookError::BucketNotFound { bucket: bucket.bucket().to_string() });
    }

    let stream = bucket.watch(pattern).await?;
    let (loaded_tx, loaded_rx) = oneshot::channel();
    let name = handler.family();

    let handle = tokio::spawn(async move {
        let stats = run_watch(stream, handler, loaded_tx, shutdown).await;
        info!("{} watch finished after {} puts, {} deletes", name, stats.applied, stats.deleted);
    });

    match loaded_rx.await {
        Ok(stats) => Ok((Worker { name, handle }, stats)),
        Err(_) => {
            warn!("{} watch ended before its snapshot loaded", name);
            handle.abort();
            Err(BookError::WatchClosed { pattern: pattern.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::valuation::MemoryValuationFeed;
    use crate::watch::MemoryBucket;

    #[tokio::test]
    async fn test_missing_bucket_aborts_startup() {
        let result = BookMirrorService::start(
            BookConfig::default(),
            Arc::new(MemoryHistory::default()),
            Arc::new(MemoryBucket::missing("KV_book")),
            Arc::new(MemoryValuationFeed::new()),
        )
        .await;

        assert!(matches!(result, Err(BookError::BucketNotFound { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_history_aborts_startup() {
        let history = MemoryHistory::default();
        history.set_unavailable(true);

        let result = BookMirrorService::start(
            BookConfig::default(),
            Arc::new(history),
            Arc::new(MemoryBucket::new("KV_book")),
            Arc::new(MemoryValuationFeed::new()),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_and_shutdown() {
        let feed = Arc::new(MemoryValuationFeed::new());
        let bucket = Arc::new(MemoryBucket::new("KV_book"));
        let service = BookMirrorService::start(
            BookConfig::default(),
            Arc::new(MemoryHistory::default()),
            bucket.clone(),
            feed.clone(),
        )
        .await
        .unwrap();

        assert_eq!(service.health_check().await, ServiceHealth::Healthy);
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(bucket.watcher_count().await, 2);

        service.shutdown().await.unwrap();
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(bucket.watcher_count().await, 0);
        assert_eq!(
            service.health_check().await,
            ServiceHealth::Unhealthy("shut down".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_bucket_starts_with_empty_caches() {
        let bucket = Arc::new(MemoryBucket::new("KV_book"));
        bucket.put("trade.5", "{}").await;
        bucket.delete("trade.5").await;

        let service = BookMirrorService::start(
            BookConfig::default(),
            Arc::new(MemoryHistory::default()),
            bucket,
            Arc::new(MemoryValuationFeed::new()),
        )
        .await
        .unwrap();

        assert_eq!(service.account_count(), 0);
        assert_eq!(service.position_count(), 0);
        assert_eq!(service.load_stats(), LoadStats::default());
        assert_eq!(service.health_check().await, ServiceHealth::Healthy);
    }
}
