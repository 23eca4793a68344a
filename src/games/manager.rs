//! Game manager
//!
//! Starts one room per (variant, stake tier) and routes lookups and bets to them.

use crate::config::EngineConfig;
use crate::errors::{ConfigurationError, GameError, HashGameResult};
use crate::games::registry::StrategyRegistry;
use crate::games::room::{GameRoom, RoomContext};
use crate::games::types::{BetRequest, Order, StakeTier};
use crate::oracle::BlockOracle;
use crate::store::RoundStore;
use crate::strategy::{GameStrategy, StrategyKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One game variant and its rooms
pub struct Game {
    kind: StrategyKind,
    strategy: Arc<dyn GameStrategy>,
    rooms: HashMap<StakeTier, Arc<GameRoom>>,
}

impl Game {
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn strategy(&self) -> &Arc<dyn GameStrategy> {
        &self.strategy
    }

    pub fn room(&self, tier: StakeTier) -> Option<&Arc<GameRoom>> {
        self.rooms.get(&tier)
    }

    pub fn tiers(&self) -> Vec<StakeTier> {
        let mut tiers: Vec<StakeTier> = self.rooms.keys().copied().collect();
        tiers.sort();
        tiers
    }
}

pub struct GameManager {
    games: HashMap<StrategyKind, Game>,
    oracle: Arc<BlockOracle>,
    shutdown_tx: watch::Sender<bool>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl GameManager {
    /// Build and start every room, then the oracle updater if configured
    pub async fn start(
        registry: StrategyRegistry,
        oracle: Arc<BlockOracle>,
        store: Arc<dyn RoundStore>,
        config: &EngineConfig,
    ) -> HashGameResult<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut games = HashMap::new();

        for kind in registry.playable_kinds() {
            let strategy = registry.strategy(kind)?;
            let Some(factory) = registry.room_factory(kind) else {
                continue;
            };

            let mut rooms = HashMap::new();
            for tier_config in &config.rooms.tiers {
                let tier = tier_config.tier;
                let limits = config.tier_limits(tier).ok_or_else(|| {
                    ConfigurationError::MissingRequired(format!("limits for tier {}", tier))
                })?;

                let room = factory(RoomContext {
                    strategy: Arc::clone(&strategy),
                    oracle: Arc::clone(&oracle),
                    store: Arc::clone(&store),
                    tier,
                    setting: config.room_setting(),
                    limits,
                    block_time: config.block_time(),
                    retry_backoff: config.retry_backoff(),
                    history_capacity: config.rooms.history_capacity,
                    settlement_queue_depth: config.rooms.settlement_queue_depth,
                    shutdown: shutdown_rx.clone(),
                });
                room.start().await?;
                rooms.insert(tier, room);
            }

            games.insert(kind, Game { kind, strategy, rooms });
        }

        let updater = if config.oracle.auto_refresh {
            Some(oracle.spawn_updater(shutdown_rx))
        } else {
            None
        };

        info!(
            games = games.len(),
            rooms = games.values().map(|g| g.rooms.len()).sum::<usize>(),
            auto_refresh = config.oracle.auto_refresh,
            "game manager started"
        );

        Ok(Self {
            games,
            oracle,
            shutdown_tx,
            updater: Mutex::new(updater),
        })
    }

    pub fn oracle(&self) -> &Arc<BlockOracle> {
        &self.oracle
    }

    pub fn game(&self, kind: StrategyKind) -> Result<&Game, GameError> {
        self.games.get(&kind).ok_or(GameError::StrategyNotFound(kind))
    }

    pub fn room(&self, kind: StrategyKind, tier: StakeTier) -> Result<Arc<GameRoom>, GameError> {
        self.game(kind)?
            .room(tier)
            .cloned()
            .ok_or(GameError::RoomNotFound { kind, tier })
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<StrategyKind> = self.games.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Route a bet to the room for `tier` of the bet's game
    pub async fn place_bet(&self, tier: StakeTier, bet: BetRequest) -> Result<Order, GameError> {
        let room = self.room(bet.prediction.kind(), tier)?;
        room.handle_bet(bet).await
    }

    /// Stop every room and the oracle updater, waiting for their tasks
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            error!("no task listening for shutdown");
        }

        if let Some(updater) = self.updater.lock().await.take() {
            if let Err(e) = updater.await {
                error!(error = %e, "oracle updater ended abnormally");
            }
        }
        for game in self.games.values() {
            for room in game.rooms.values() {
                room.join().await;
            }
        }
        info!("game manager stopped");
    }
}
