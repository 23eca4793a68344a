//! Strategy registry
//!
//! An owned map from game variant to its shared strategy and to the function
//! that builds its rooms. The manager consumes one at start-up.

use crate::errors::GameError;
use crate::games::room::{GameRoom, RoomContext};
use crate::strategy::{
    BankerPlayerTieStrategy, BullBullStrategy, GameStrategy, LuckyStrategy, SingleDoubleStrategy,
    SmallBigStrategy, StrategyKind,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds one room from its context
pub type RoomFactory = Arc<dyn Fn(RoomContext) -> Arc<GameRoom> + Send + Sync>;

/// The stock factory: a plain [`GameRoom`]
pub fn default_room_factory() -> RoomFactory {
    Arc::new(|ctx| Arc::new(GameRoom::new(ctx)))
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn GameStrategy>>,
    factories: HashMap<StrategyKind, RoomFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five built-in strategies, each with the stock room factory
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn GameStrategy>; 5] = [
            Arc::new(SingleDoubleStrategy),
            Arc::new(SmallBigStrategy),
            Arc::new(BullBullStrategy),
            Arc::new(BankerPlayerTieStrategy),
            Arc::new(LuckyStrategy),
        ];
        for strategy in builtins {
            let kind = strategy.kind();
            registry.strategies.insert(kind, strategy);
            registry.factories.insert(kind, default_room_factory());
        }
        registry
    }

    pub fn register_strategy(&mut self, strategy: Arc<dyn GameStrategy>) -> Result<(), GameError> {
        let kind = strategy.kind();
        if self.strategies.contains_key(&kind) {
            return Err(GameError::DuplicateStrategy(kind));
        }
        self.strategies.insert(kind, strategy);
        Ok(())
    }

    pub fn register_room_factory(&mut self, kind: StrategyKind, factory: RoomFactory) -> Result<(), GameError> {
        if self.factories.contains_key(&kind) {
            return Err(GameError::DuplicateRoomFactory(kind));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    pub fn strategy(&self, kind: StrategyKind) -> Result<Arc<dyn GameStrategy>, GameError> {
        self.strategies
            .get(&kind)
            .cloned()
            .ok_or(GameError::StrategyNotFound(kind))
    }

    pub fn room_factory(&self, kind: StrategyKind) -> Option<RoomFactory> {
        self.factories.get(&kind).cloned()
    }

    /// Kinds with both a strategy and a room factory, in stable order
    pub fn playable_kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<StrategyKind> = self
            .strategies
            .keys()
            .filter(|kind| self.factories.contains_key(kind))
            .copied()
            .collect();
        kinds.sort();
        kinds
    }
}
