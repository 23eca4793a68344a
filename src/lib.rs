//! Hashgame - provably fair hash-game round engine
//!
//! Rounds settle against the hash of a future block: players bet while a
//! round is open, and once the target block is mined its hash decides the
//! outcome and every bet is paid from it.
//!
//! - [`oracle`]: block height feed and block cache over remote explorers
//! - [`strategy`]: outcome and payout rules per game variant
//! - [`games`]: rooms, settlement, strategy registry and the game manager
//! - [`store`]: persistence gateway for rounds and orders

pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod oracle;
pub mod store;
pub mod strategy;
pub mod test_support;

pub use common::config::ConfigLoader;
pub use config::EngineConfig;
pub use errors::{GameError, HashGameError, HashGameResult, OracleError, PersistenceError};
pub use games::{BetRequest, GameManager, GameRoom, Order, RoundRecord, RoundStatus, StakeTier, StrategyRegistry};
pub use oracle::BlockOracle;
pub use store::{MemoryStore, RocksStore, RoundStore};
pub use strategy::{GameStrategy, Outcome, Prediction, StrategyKind};
