//! Block oracle
//!
//! Turns a set of flaky, rate-limited explorer endpoints into:
//! - an atomically readable latest height,
//! - per-subscriber height notifications,
//! - a bounded cache of historical blocks with endpoint failover.
//!
//! A single background updater drives the feed; every other accessor is safe to
//! call from any room at any time and reports "no block yet" as a retryable error.

pub mod cache;
pub mod explorer;
pub mod limiter;
pub mod subscription;

pub use cache::BlockCache;
pub use explorer::{BlockExplorer, HttpExplorer};
pub use limiter::RateLimiter;
pub use subscription::HeightSubscription;

use crate::common::types::Block;
use crate::config::OracleConfig;
use dashmap::DashMap;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{
    sync::{broadcast, watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Errors surfaced by the oracle and its explorers
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("No block observed yet")]
    NoBlockYet,

    #[error("Block {0} not produced yet")]
    BlockNotProduced(u64),

    #[error("Explorer rate limit reached")]
    RateLimited,

    #[error("No explorer endpoints configured")]
    NoEndpoints,

    #[error("All {attempts} endpoints failed fetching {target}: {last_error}")]
    AllEndpointsFailed {
        target: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Endpoint {endpoint} answered HTTP {status}")]
    BadStatus { endpoint: String, status: u16 },

    #[error("Endpoint {endpoint} returned an empty payload")]
    EmptyPayload { endpoint: String },

    #[error("Malformed payload from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

#[derive(Clone, Copy, Debug)]
enum FetchTarget {
    Number(u64),
    Latest,
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Number(n) => write!(f, "block {}", n),
            FetchTarget::Latest => write!(f, "latest block"),
        }
    }
}

/// Chain head as last fetched, with the gap used to skip redundant refetches
struct LatestBlock {
    block: Block,
    fetched_at: Instant,
    gap: Duration,
}

#[derive(Default)]
struct OracleCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    endpoint_failures: AtomicU64,
    rate_limited: AtomicU64,
}

/// Point-in-time oracle statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleStats {
    pub latest_height: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub endpoint_failures: u64,
    pub rate_limited: u64,
}

pub struct BlockOracle {
    explorers: Vec<Arc<dyn BlockExplorer>>,
    limiter: RateLimiter,
    cache: BlockCache,
    /// One gate per height being fetched, so concurrent misses share a request
    fetch_gates: DashMap<u64, Arc<Mutex<()>>>,
    latest: RwLock<Option<LatestBlock>>,
    latest_height: AtomicU64,
    height_tx: broadcast::Sender<u64>,
    poll_interval: Duration,
    counters: OracleCounters,
}

impl BlockOracle {
    pub fn new(explorers: Vec<Arc<dyn BlockExplorer>>, config: &OracleConfig) -> Self {
        let (height_tx, _) = broadcast::channel(config.subscriber_buffer.max(1));
        Self {
            explorers,
            limiter: RateLimiter::new(config.requests_per_second, config.burst),
            cache: BlockCache::new(config.block_cache_capacity),
            fetch_gates: DashMap::new(),
            latest: RwLock::new(None),
            latest_height: AtomicU64::new(0),
            height_tx,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            counters: OracleCounters::default(),
        }
    }

    /// Build HTTP explorers for every configured endpoint
    pub fn from_config(config: &OracleConfig) -> Self {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let explorers = config
            .endpoints
            .iter()
            .map(|url| Arc::new(HttpExplorer::new(url.clone(), timeout)) as Arc<dyn BlockExplorer>)
            .collect();
        Self::new(explorers, config)
    }

    /// Latest observed height; 0 until the first block is seen
    pub fn latest_height(&self) -> u64 {
        self.latest_height.load(Ordering::Acquire)
    }

    /// Latest height, or `NoBlockYet` before the first head was observed
    pub fn current_height(&self) -> Result<u64, OracleError> {
        match self.latest_height() {
            0 => Err(OracleError::NoBlockYet),
            height => Ok(height),
        }
    }

    pub fn subscribe_height(&self) -> HeightSubscription {
        HeightSubscription::new(self.height_tx.subscribe())
    }

    /// Block at `height`, from cache or the first endpoint that answers
    pub async fn get_block(&self, height: u64) -> Result<Block, OracleError> {
        if let Some(block) = self.cache.get(height).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let latest = self.latest_height();
        if latest != 0 && height > latest {
            return Err(OracleError::BlockNotProduced(height));
        }

        let gate = self
            .fetch_gates
            .entry(height)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = self.fetch_gated(height, &gate).await;
        self.fetch_gates.remove_if(&height, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    async fn fetch_gated(&self, height: u64, gate: &Mutex<()>) -> Result<Block, OracleError> {
        let _turn = gate.lock().await;
        // Whoever held the gate before us may have filled the cache.
        if let Some(block) = self.cache.get(height).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block);
        }

        if !self.limiter.try_acquire().await {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(OracleError::RateLimited);
        }

        let block = self.fetch(FetchTarget::Number(height)).await?;
        self.cache.insert(block.clone()).await;
        Ok(block)
    }

    /// Chain head; served from memory while the previous inter-block gap has not elapsed
    pub async fn get_latest_block(&self) -> Result<Block, OracleError> {
        if let Some(block) = self.fresh_latest().await {
            return Ok(block);
        }

        if !self.limiter.try_acquire().await {
            self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(OracleError::RateLimited);
        }

        let block = self.fetch(FetchTarget::Latest).await?;
        self.observe_latest(block.clone()).await;
        Ok(block)
    }

    /// One updater tick: wait for a token, fetch the head, notify on a new height.
    ///
    /// Returns whether the height advanced.
    pub async fn refresh(&self) -> Result<bool, OracleError> {
        if self.fresh_latest().await.is_some() {
            return Ok(false);
        }

        self.limiter.acquire().await;
        let block = self.fetch(FetchTarget::Latest).await?;
        Ok(self.observe_latest(block).await)
    }

    /// Spawn the background updater; it stops when `shutdown` flips to true
    pub fn spawn_updater(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let oracle = Arc::clone(self);
        tokio::spawn(async move {
            info!(
                endpoints = oracle.explorers.len(),
                interval_ms = oracle.poll_interval.as_millis() as u64,
                "block oracle updater started"
            );
            let mut ticker = tokio::time::interval(oracle.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        crate::common::task::guarded("oracle-updater", async {
                            if let Err(e) = oracle.refresh().await {
                                warn!(error = %e, "block oracle refresh failed");
                            }
                        })
                        .await;
                    }
                }
            }
            info!("block oracle updater stopped");
        })
    }

    pub async fn stats(&self) -> OracleStats {
        OracleStats {
            latest_height: self.latest_height(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            endpoint_failures: self.counters.endpoint_failures.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
        }
    }

    async fn fresh_latest(&self) -> Option<Block> {
        let latest = self.latest.read().await;
        latest
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < cached.gap)
            .map(|cached| cached.block.clone())
    }

    /// Record a fetched head. Heights only move forward.
    async fn observe_latest(&self, block: Block) -> bool {
        let mut latest = self.latest.write().await;

        let gap = match latest.as_ref() {
            Some(previous) if block.number > previous.block.number => {
                let blocks = block.number - previous.block.number;
                let millis = block.timestamp.saturating_sub(previous.block.timestamp) / blocks;
                Duration::from_millis(millis)
            }
            Some(previous) => previous.gap,
            None => Duration::ZERO,
        };

        let advanced = block.number > self.latest_height();
        if advanced {
            self.cache.insert(block.clone()).await;
            self.latest_height.store(block.number, Ordering::Release);
            debug!(height = block.number, hash = %block.hash, "new chain head");
            // No receivers is fine: rooms may not have subscribed yet.
            let _ = self.height_tx.send(block.number);
        }

        // A head that did not move keeps its original window, so polling
        // resumes as soon as the expected gap has passed.
        if advanced || latest.is_none() {
            *latest = Some(LatestBlock {
                block,
                fetched_at: Instant::now(),
                gap,
            });
        }

        advanced
    }

    async fn fetch(&self, target: FetchTarget) -> Result<Block, OracleError> {
        if self.explorers.is_empty() {
            return Err(OracleError::NoEndpoints);
        }

        let mut last_error = String::new();
        for explorer in &self.explorers {
            let result = match target {
                FetchTarget::Number(number) => explorer.block_by_number(number).await,
                FetchTarget::Latest => explorer.latest_block().await,
            };

            match result {
                Ok(block) => return Ok(block),
                Err(e) => {
                    self.counters.endpoint_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(endpoint = explorer.name(), %target, error = %e, "explorer request failed; trying next endpoint");
                    last_error = e.to_string();
                }
            }
        }

        Err(OracleError::AllEndpointsFailed {
            target: target.to_string(),
            attempts: self.explorers.len(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{block_with_hash, ScriptedExplorer};

    fn config() -> OracleConfig {
        OracleConfig {
            endpoints: vec![],
            requests_per_second: 1_000,
            burst: 1_000,
            poll_interval_ms: 5,
            block_cache_capacity: 4,
            subscriber_buffer: 8,
            ..Default::default()
        }
    }

    fn oracle_with(explorers: Vec<Arc<ScriptedExplorer>>, config: &OracleConfig) -> Arc<BlockOracle> {
        let explorers = explorers
            .into_iter()
            .map(|e| e as Arc<dyn BlockExplorer>)
            .collect();
        Arc::new(BlockOracle::new(explorers, config))
    }

    #[tokio::test]
    async fn test_no_block_yet_is_an_error() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        let oracle = oracle_with(vec![explorer], &config());

        assert_eq!(oracle.latest_height(), 0);
        assert!(matches!(oracle.current_height(), Err(OracleError::NoBlockYet)));
        assert!(oracle.get_latest_block().await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_updates_height_and_notifies() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        let oracle = oracle_with(vec![explorer.clone()], &config());
        let mut sub = oracle.subscribe_height();

        explorer.push_block(block_with_hash(100, "aa"));
        assert!(oracle.refresh().await.unwrap());
        assert_eq!(oracle.latest_height(), 100);
        assert_eq!(sub.recv().await, Some(100));

        // Same head again: no notification, no height change.
        assert!(!oracle.refresh().await.unwrap());
        assert_eq!(oracle.latest_height(), 100);
    }

    #[tokio::test]
    async fn test_failover_to_second_endpoint() {
        let broken = Arc::new(ScriptedExplorer::new("broken"));
        broken.set_fail_block_lookups(true);
        let healthy = Arc::new(ScriptedExplorer::new("healthy"));
        healthy.insert_block(block_with_hash(7, "77"));

        let oracle = oracle_with(vec![broken.clone(), healthy.clone()], &config());
        let block = oracle.get_block(7).await.unwrap();

        assert_eq!(block.hash, "77");
        assert_eq!(broken.calls(), 1);
        assert_eq!(oracle.stats().await.endpoint_failures, 1);
    }

    #[tokio::test]
    async fn test_all_endpoints_failing() {
        let a = Arc::new(ScriptedExplorer::new("a"));
        let b = Arc::new(ScriptedExplorer::new("b"));
        a.set_fail_block_lookups(true);
        b.set_fail_block_lookups(true);

        let oracle = oracle_with(vec![a, b], &config());
        match oracle.get_block(3).await {
            Err(OracleError::AllEndpointsFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected failover exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_block_is_cache_first() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        explorer.insert_block(block_with_hash(5, "55"));
        let oracle = oracle_with(vec![explorer.clone()], &config());

        oracle.get_block(5).await.unwrap();
        oracle.get_block(5).await.unwrap();

        assert_eq!(explorer.calls(), 1);
        let stats = oracle.stats().await;
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_future_block_is_not_requested() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        explorer.push_block(block_with_hash(10, "10"));
        let oracle = oracle_with(vec![explorer.clone()], &config());
        oracle.refresh().await.unwrap();
        let calls = explorer.calls();

        assert!(matches!(oracle.get_block(11).await, Err(OracleError::BlockNotProduced(11))));
        assert_eq!(explorer.calls(), calls);
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_fails_fast() {
        let mut cfg = config();
        cfg.requests_per_second = 1;
        cfg.burst = 1;
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        explorer.insert_block(block_with_hash(1, "01"));
        explorer.insert_block(block_with_hash(2, "02"));
        let oracle = oracle_with(vec![explorer], &cfg);

        assert!(oracle.get_block(1).await.is_ok());
        assert!(matches!(oracle.get_block(2).await, Err(OracleError::RateLimited)));
        assert_eq!(oracle.stats().await.rate_limited, 1);
    }

    #[tokio::test]
    async fn test_latest_block_window_skips_refetch() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        let oracle = oracle_with(vec![explorer.clone()], &config());

        let mut first = block_with_hash(1, "01");
        first.timestamp = 0;
        explorer.push_block(first);
        oracle.get_latest_block().await.unwrap();

        // Two blocks one minute apart: the observed gap is 60s.
        let mut second = block_with_hash(2, "02");
        second.timestamp = 60_000;
        explorer.push_block(second);
        oracle.get_latest_block().await.unwrap();
        let calls = explorer.calls();

        explorer.push_block(block_with_hash(3, "03"));
        let cached = oracle.get_latest_block().await.unwrap();
        assert_eq!(cached.number, 2);
        assert_eq!(explorer.calls(), calls);
    }

    #[tokio::test]
    async fn test_unchanged_head_keeps_gap_window() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        let oracle = oracle_with(vec![explorer.clone()], &config());

        explorer.push_block(block_with_hash(1, "01"));
        oracle.refresh().await.unwrap();
        let mut second = block_with_hash(2, "02");
        second.timestamp = 200;
        explorer.push_block(second);
        assert!(oracle.refresh().await.unwrap());

        // Past the 200ms gap the head is polled, but it has not moved yet.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!oracle.refresh().await.unwrap());

        // The next block must be picked up right away, not one gap later.
        let mut third = block_with_hash(3, "03");
        third.timestamp = 400;
        explorer.push_block(third);
        assert!(oracle.refresh().await.unwrap());
        assert_eq!(oracle.latest_height(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let mut cfg = config();
        cfg.requests_per_second = 1;
        cfg.burst = 2;
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        explorer.insert_block(block_with_hash(5, "55"));
        explorer.set_latency(Duration::from_millis(30));
        let oracle = oracle_with(vec![explorer.clone()], &cfg);

        let lookups = (0..15).map(|_| oracle.get_block(5));
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(|r| r.as_ref().map(|b| b.hash == "55").unwrap_or(false)));
        assert_eq!(explorer.calls(), 1);
        assert_eq!(oracle.stats().await.rate_limited, 0);
    }

    #[tokio::test]
    async fn test_updater_feeds_subscribers_until_shutdown() {
        let explorer = Arc::new(ScriptedExplorer::new("primary"));
        explorer.push_block(block_with_hash(20, "20"));
        let oracle = oracle_with(vec![explorer.clone()], &config());
        let mut sub = oracle.subscribe_height();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = oracle.spawn_updater(shutdown_rx);

        assert_eq!(sub.recv().await, Some(20));
        explorer.push_block(block_with_hash(21, "21"));
        assert_eq!(sub.recv().await, Some(21));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("updater stops on shutdown")
            .unwrap();
    }
}
