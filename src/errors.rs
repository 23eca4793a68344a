//! Error types for the hash-game engine
//!
//! One root error wraps the per-subsystem errors so callers that only care about
//! "did it work" can use [`HashGameResult`], while rooms and strategies return the
//! narrower leaf types.

use crate::games::types::{RoundStatus, StakeTier};
use crate::strategy::StrategyKind;
use std::fmt;

pub use crate::oracle::OracleError;

/// Root error type for all engine operations
#[derive(Debug)]
pub enum HashGameError {
    /// Configuration loading and validation errors
    Configuration(ConfigurationError),

    /// Block oracle errors (remote explorer, rate limiting, cache)
    Oracle(OracleError),

    /// Round, bet and strategy errors
    Game(GameError),

    /// Persistence gateway errors
    Persistence(PersistenceError),
}

/// Configuration and validation errors
#[derive(Debug)]
pub enum ConfigurationError {
    ValidationFailed(String),
    MissingRequired(String),
    InvalidValue { field: String, value: String, reason: String },
    LoadFailed(String),
    SaveFailed(String),
}

/// Domain errors raised by rooms, strategies and the manager
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("No round is open for betting")]
    NoOpenRound,

    #[error("Round {round_id} is not accepting bets (status: {status})")]
    BettingClosed { round_id: String, status: RoundStatus },

    #[error("Invalid bet amount: {0}")]
    InvalidBetAmount(f64),

    #[error("Bet amount {amount} outside tier limits [{min}, {max}]")]
    BetOutOfRange { amount: f64, min: f64, max: f64 },

    #[error("Prediction for {found} submitted to a {expected} room")]
    InvalidPrediction { expected: StrategyKind, found: StrategyKind },

    #[error("Outcome of {found} handed to the {expected} strategy")]
    VariantMismatch { expected: StrategyKind, found: StrategyKind },

    #[error("Malformed block hash '{hash}': {reason}")]
    MalformedHash { hash: String, reason: &'static str },

    #[error("Strategy not found: {0}")]
    StrategyNotFound(StrategyKind),

    #[error("Room not found: {kind}/{tier}")]
    RoomNotFound { kind: StrategyKind, tier: StakeTier },

    #[error("Strategy already registered: {0}")]
    DuplicateStrategy(StrategyKind),

    #[error("Room factory already registered: {0}")]
    DuplicateRoomFactory(StrategyKind),

    #[error("Round targeting height {0} not found")]
    RoundNotFound(u64),

    #[error("Room already started")]
    RoomAlreadyStarted,
}

/// Persistence gateway errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage open failed: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Corrupted record {key}: {reason}")]
    CorruptedData { key: String, reason: String },

    #[error("Settlement batch partially failed for {} orders", .failed.len())]
    PartialSettlement { failed: Vec<String> },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl fmt::Display for HashGameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashGameError::Configuration(e) => write!(f, "Configuration error: {}", e),
            HashGameError::Oracle(e) => write!(f, "Oracle error: {}", e),
            HashGameError::Game(e) => write!(f, "Game error: {}", e),
            HashGameError::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::ValidationFailed(msg) => write!(f, "Validation failed: {}", msg),
            ConfigurationError::MissingRequired(field) => write!(f, "Missing required field: {}", field),
            ConfigurationError::InvalidValue { field, value, reason } => {
                write!(f, "Invalid value for {}: '{}' ({})", field, value, reason)
            }
            ConfigurationError::LoadFailed(msg) => write!(f, "Failed to load configuration: {}", msg),
            ConfigurationError::SaveFailed(msg) => write!(f, "Failed to save configuration: {}", msg),
        }
    }
}

impl std::error::Error for HashGameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HashGameError::Configuration(e) => Some(e),
            HashGameError::Oracle(e) => Some(e),
            HashGameError::Game(e) => Some(e),
            HashGameError::Persistence(e) => Some(e),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for HashGameError {
    fn from(e: ConfigurationError) -> Self {
        HashGameError::Configuration(e)
    }
}

impl From<OracleError> for HashGameError {
    fn from(e: OracleError) -> Self {
        HashGameError::Oracle(e)
    }
}

impl From<GameError> for HashGameError {
    fn from(e: GameError) -> Self {
        HashGameError::Game(e)
    }
}

impl From<PersistenceError> for HashGameError {
    fn from(e: PersistenceError) -> Self {
        HashGameError::Persistence(e)
    }
}

impl From<rocksdb::Error> for PersistenceError {
    fn from(e: rocksdb::Error) -> Self {
        PersistenceError::WriteFailed(e.to_string())
    }
}

// Convenience type alias for Results
pub type HashGameResult<T> = Result<T, HashGameError>;
