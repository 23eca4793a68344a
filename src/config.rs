//! Configuration management with validation and defaults
//!
//! Every tunable of the engine lives here: explorer endpoints and rate limits,
//! round geometry, stake tiers, settlement retry schedule, storage and logging.

use crate::games::types::{RoomSetting, StakeTier, TierLimits};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub oracle: OracleConfig,
    pub rooms: RoomConfig,
    pub settlement: SettlementConfig,
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            rooms: RoomConfig::default(),
            settlement: SettlementConfig::default(),
            storage: StorageConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// Block explorer feed configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Explorer base URLs, tried in order on every fetch
    pub endpoints: Vec<String>,
    /// Token bucket refill rate shared by all endpoints
    pub requests_per_second: u32,
    /// Token bucket capacity
    pub burst: u32,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Number of historical blocks kept in memory
    pub block_cache_capacity: usize,
    /// Per-subscriber height buffer; older heights are dropped on overflow
    pub subscriber_buffer: usize,
    /// Spawn the background poller when the manager starts
    pub auto_refresh: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:8090/api".to_string()],
            requests_per_second: 5,
            burst: 5,
            poll_interval_ms: 1000,
            request_timeout_ms: 5000,
            block_cache_capacity: 512,
            subscriber_buffer: 64,
            auto_refresh: true,
        }
    }
}

/// Round geometry shared by every room, plus per-tier bet limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Rounds settle on multiples of this height
    pub round_interval: u64,
    /// Betting closes this many blocks before the target
    pub lock_before_blocks: u64,
    /// Acceptance fee charged on every stake
    pub fee_basis_points: u32,
    /// Assumed block time used to estimate lock/end timestamps
    pub block_time_ms: u64,
    /// Superseded rounds kept for history queries
    pub history_capacity: usize,
    pub settlement_queue_depth: usize,
    pub tiers: Vec<TierConfig>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            round_interval: 20,
            lock_before_blocks: 2,
            fee_basis_points: 0,
            block_time_ms: 3000,
            history_capacity: 100,
            settlement_queue_depth: 16,
            tiers: vec![
                TierConfig { tier: StakeTier::Normal, min_bet: 1.0, max_bet: 1_000.0 },
                TierConfig { tier: StakeTier::Mid, min_bet: 100.0, max_bet: 10_000.0 },
                TierConfig { tier: StakeTier::High, min_bet: 1_000.0, max_bet: 100_000.0 },
            ],
        }
    }
}

/// Bet limits for one stake tier
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    pub tier: StakeTier,
    pub min_bet: f64,
    pub max_bet: f64,
}

/// Settlement retry schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Delay before each retry attempt; its length is the retry budget
    pub retry_backoff_ms: Vec<u64>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: vec![3_000, 5_000, 10_000],
        }
    }
}

/// Persistence backend selection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/hashgame".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Full `tracing` filter directive; overrides `log_level` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Configuration for tests: in-memory storage, no poller, millisecond timings
    pub fn testing() -> Self {
        Self {
            oracle: OracleConfig {
                endpoints: vec![],
                requests_per_second: 1_000,
                burst: 1_000,
                poll_interval_ms: 10,
                request_timeout_ms: 200,
                auto_refresh: false,
                ..Default::default()
            },
            rooms: RoomConfig {
                round_interval: 5,
                lock_before_blocks: 1,
                block_time_ms: 1_000,
                ..Default::default()
            },
            settlement: SettlementConfig {
                retry_backoff_ms: vec![10, 10, 10],
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.oracle.requests_per_second == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "requests_per_second must be > 0".to_string(),
            ));
        }

        if self.oracle.burst == 0 {
            return Err(ConfigValidationError::InvalidValue("burst must be > 0".to_string()));
        }

        if self.oracle.block_cache_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "block_cache_capacity must be > 0".to_string(),
            ));
        }

        if self.oracle.subscriber_buffer == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "subscriber_buffer must be > 0".to_string(),
            ));
        }

        if self.rooms.round_interval == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "round_interval must be > 0".to_string(),
            ));
        }

        if self.rooms.lock_before_blocks >= self.rooms.round_interval {
            return Err(ConfigValidationError::LogicalInconsistency(
                "lock_before_blocks must be smaller than round_interval".to_string(),
            ));
        }

        if self.rooms.fee_basis_points >= 10_000 {
            return Err(ConfigValidationError::InvalidValue(
                "fee_basis_points must be < 10000".to_string(),
            ));
        }

        if self.rooms.block_time_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "block_time_ms must be > 0".to_string(),
            ));
        }

        if self.rooms.settlement_queue_depth == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "settlement_queue_depth must be > 0".to_string(),
            ));
        }

        if self.rooms.tiers.is_empty() {
            return Err(ConfigValidationError::MissingRequired("rooms.tiers".to_string()));
        }

        for (index, tier) in self.rooms.tiers.iter().enumerate() {
            if !(tier.min_bet > 0.0) || tier.max_bet < tier.min_bet {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "tier {} limits [{}, {}] are not a positive range",
                    tier.tier, tier.min_bet, tier.max_bet
                )));
            }
            if self.rooms.tiers[..index].iter().any(|t| t.tier == tier.tier) {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "tier {} configured twice",
                    tier.tier
                )));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.oracle.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.request_timeout_ms)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.rooms.block_time_ms)
    }

    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.settlement
            .retry_backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn room_setting(&self) -> RoomSetting {
        RoomSetting {
            round_interval: self.rooms.round_interval,
            lock_before_blocks: self.rooms.lock_before_blocks,
            fee_basis_points: self.rooms.fee_basis_points,
        }
    }

    pub fn tier_limits(&self, tier: StakeTier) -> Option<TierLimits> {
        self.rooms
            .tiers
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| TierLimits { min_bet: t.min_bet, max_bet: t.max_bet })
    }

    /// Effective `tracing` filter directive
    pub fn log_filter(&self) -> String {
        self.monitoring
            .log_filter
            .clone()
            .unwrap_or_else(|| format!("hashgame={}", self.monitoring.log_level.as_filter()))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    InvalidValue(String),
    LogicalInconsistency(String),
    MissingRequired(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigValidationError::LogicalInconsistency(msg) => write!(f, "Configuration logical inconsistency: {}", msg),
            ConfigValidationError::MissingRequired(msg) => write!(f, "Missing required configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config_is_valid() {
        let config = EngineConfig::testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(!config.oracle.auto_refresh);
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = EngineConfig::default();
        config.rooms.round_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_window_must_fit_in_round() {
        let mut config = EngineConfig::default();
        config.rooms.lock_before_blocks = config.rooms.round_interval;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::LogicalInconsistency(_))
        ));
    }

    #[test]
    fn test_duplicate_tier_rejected() {
        let mut config = EngineConfig::default();
        config.rooms.tiers.push(TierConfig { tier: StakeTier::Normal, min_bet: 1.0, max_bet: 2.0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_conversions() {
        let config = EngineConfig::default();
        assert_eq!(config.block_time(), Duration::from_millis(3000));
        assert_eq!(
            config.retry_backoff(),
            vec![Duration::from_secs(3), Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[test]
    fn test_tier_limits_lookup() {
        let config = EngineConfig::default();
        let limits = config.tier_limits(StakeTier::Mid).expect("mid tier configured");
        assert_eq!(limits.min_bet, 100.0);
        assert_eq!(limits.max_bet, 10_000.0);
    }

    #[test]
    fn test_log_filter_defaults_to_level() {
        let mut config = EngineConfig::default();
        assert_eq!(config.log_filter(), "hashgame=info");
        config.monitoring.log_filter = Some("debug".to_string());
        assert_eq!(config.log_filter(), "debug");
    }
}
