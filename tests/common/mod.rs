//! Shared engine harness for integration tests

#![allow(dead_code)]

use hashgame::games::default_room_factory;
use hashgame::oracle::BlockExplorer;
use hashgame::test_support::{block_with_hash, hash_ending, ScriptedExplorer};
use hashgame::{BlockOracle, EngineConfig, GameManager, RoundStore, StakeTier, StrategyKind, StrategyRegistry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    pub manager: GameManager,
    pub explorer: Arc<ScriptedExplorer>,
    pub oracle: Arc<BlockOracle>,
}

/// Testing config with a single Normal-tier room per game
pub fn single_tier_config() -> EngineConfig {
    let mut config = EngineConfig::testing();
    config.rooms.tiers.retain(|t| t.tier == StakeTier::Normal);
    config
}

/// Start a manager for `kinds` with the chain head at height 1
pub async fn start_engine(kinds: &[StrategyKind], config: EngineConfig, store: Arc<dyn RoundStore>) -> Engine {
    let defaults = StrategyRegistry::with_defaults();
    let mut registry = StrategyRegistry::new();
    for kind in kinds {
        registry
            .register_strategy(defaults.strategy(*kind).expect("built-in strategy"))
            .expect("register strategy");
        registry
            .register_room_factory(*kind, default_room_factory())
            .expect("register factory");
    }

    let explorer = Arc::new(ScriptedExplorer::new("scripted"));
    let oracle = Arc::new(BlockOracle::new(
        vec![explorer.clone() as Arc<dyn BlockExplorer>],
        &config.oracle,
    ));
    explorer.push_block(block_with_hash(1, &hash_ending("1")));
    oracle.refresh().await.expect("initial head");

    let manager = GameManager::start(registry, oracle.clone(), store, &config)
        .await
        .expect("manager starts");

    Engine { manager, explorer, oracle }
}

impl Engine {
    /// Mine `height` with the given hash and let the oracle observe it
    pub async fn mine(&self, height: u64, hash: &str) {
        self.explorer.push_block(block_with_hash(height, hash));
        self.oracle.refresh().await.expect("refresh");
    }

    /// Mine every height in `from..=to` with filler hashes
    pub async fn mine_range(&self, from: u64, to: u64) {
        for height in from..=to {
            self.mine(height, &hash_ending(&format!("{:02}", height % 100))).await;
        }
    }
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
