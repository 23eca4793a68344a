use crate::common::types::current_timestamp_ms;
use crate::errors::GameError;
use crate::strategy::{Outcome, Prediction, StrategyKind};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stake tier; every game runs one room per tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StakeTier {
    Normal,
    Mid,
    High,
}

impl StakeTier {
    pub const ALL: [StakeTier; 3] = [StakeTier::Normal, StakeTier::Mid, StakeTier::High];
}

impl fmt::Display for StakeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeTier::Normal => write!(f, "normal"),
            StakeTier::Mid => write!(f, "mid"),
            StakeTier::High => write!(f, "high"),
        }
    }
}

/// Round lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    /// Reserved; rounds are created directly in `Betting`
    Preparing,
    Betting,
    Locked,
    Settling,
    Completed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Preparing => write!(f, "preparing"),
            RoundStatus::Betting => write!(f, "betting"),
            RoundStatus::Locked => write!(f, "locked"),
            RoundStatus::Settling => write!(f, "settling"),
            RoundStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Won,
    Lost,
    Refunded,
}

/// Round geometry shared by all rooms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSetting {
    pub round_interval: u64,
    pub lock_before_blocks: u64,
    pub fee_basis_points: u32,
}

impl RoomSetting {
    /// Smallest multiple of the interval strictly above `height`
    pub fn next_height(&self, height: u64) -> u64 {
        (height / self.round_interval + 1) * self.round_interval
    }

    /// Fee taken from a stake on acceptance
    pub fn acceptance_fee(&self, amount: f64) -> f64 {
        amount * self.fee_basis_points as f64 / 10_000.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierLimits {
    pub min_bet: f64,
    pub max_bet: f64,
}

impl TierLimits {
    pub fn check(&self, amount: f64) -> Result<(), GameError> {
        if amount < self.min_bet || amount > self.max_bet {
            return Err(GameError::BetOutOfRange {
                amount,
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        Ok(())
    }
}

/// A bet as submitted by a player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub uid: String,
    pub prediction: Prediction,
    pub amount: f64,
}

impl BetRequest {
    pub fn new(uid: impl Into<String>, prediction: Prediction, amount: f64) -> Self {
        Self {
            uid: uid.into(),
            prediction,
            amount,
        }
    }
}

/// An accepted bet. Mutated once at settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub uid: String,
    pub round_id: String,
    pub variant: StrategyKind,
    pub tier: StakeTier,
    pub target_height: u64,
    pub prediction: Prediction,
    pub bet_amount: f64,
    /// Stake left in play after the acceptance fee
    pub delivery_amount: f64,
    /// Acceptance fee plus settlement fee
    pub fee: f64,
    pub reward_amount: f64,
    pub status: OrderStatus,
    pub created_at: u64,
    pub end_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub block_height: u64,
    pub block_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One round of one room. Owned by its room, mutated under the room lock.
#[derive(Debug)]
pub struct Round {
    pub id: String,
    pub variant: StrategyKind,
    pub tier: StakeTier,
    pub target_height: u64,
    pub start_time: u64,
    pub lock_time: u64,
    pub end_time: u64,
    pub status: RoundStatus,
    pub settled: bool,
    pub result: Option<RoundResult>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub bets: DashMap<String, Order>,
    /// Accepted orders whose durable write has not finished yet
    pub unconfirmed: DashSet<String>,
}

impl Round {
    /// Open a round at `target_height` while the chain is at `current_height`.
    ///
    /// End and lock times are estimated from the block time.
    pub fn open(
        variant: StrategyKind,
        tier: StakeTier,
        target_height: u64,
        current_height: u64,
        setting: &RoomSetting,
        block_time: Duration,
    ) -> Self {
        let block_ms = block_time.as_millis() as u64;
        let estimated = target_height.saturating_sub(current_height) * block_ms;
        let lock_window = setting.lock_before_blocks * block_ms;
        let now = current_timestamp_ms();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            variant,
            tier,
            target_height,
            start_time: now,
            lock_time: now + estimated.saturating_sub(lock_window),
            end_time: now + estimated,
            status: RoundStatus::Betting,
            settled: false,
            result: None,
            error: None,
            retry_count: 0,
            bets: DashMap::new(),
            unconfirmed: DashSet::new(),
        }
    }

    pub fn is_open_for_bets(&self, now_ms: u64) -> bool {
        self.status == RoundStatus::Betting && now_ms < self.lock_time
    }

    pub fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.bets.iter().map(|entry| entry.value().clone()).collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        orders
    }

    pub fn record(&self) -> RoundRecord {
        RoundRecord {
            id: self.id.clone(),
            variant: self.variant,
            tier: self.tier,
            target_height: self.target_height,
            start_time: self.start_time,
            lock_time: self.lock_time,
            end_time: self.end_time,
            status: self.status,
            settled: self.settled,
            result: self.result.clone(),
            error: self.error.clone(),
            retry_count: self.retry_count,
            bet_count: self.bets.len(),
            total_bet: self.bets.iter().map(|entry| entry.value().bet_amount).sum(),
        }
    }
}

/// Persisted and queryable view of a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub id: String,
    pub variant: StrategyKind,
    pub tier: StakeTier,
    pub target_height: u64,
    pub start_time: u64,
    pub lock_time: u64,
    pub end_time: u64,
    pub status: RoundStatus,
    pub settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RoundResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub bet_count: usize,
    pub total_bet: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub variant: StrategyKind,
    pub tier: StakeTier,
    pub latest_height: u64,
    pub current: Option<RoundRecord>,
    pub last_settled: Option<RoundRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomStats {
    pub bets_accepted: u64,
    pub bets_rejected: u64,
    pub rounds_settled: u64,
    pub settlement_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting() -> RoomSetting {
        RoomSetting {
            round_interval: 20,
            lock_before_blocks: 2,
            fee_basis_points: 250,
        }
    }

    #[test]
    fn test_next_height_is_strictly_above() {
        let s = setting();
        assert_eq!(s.next_height(0), 20);
        assert_eq!(s.next_height(19), 20);
        assert_eq!(s.next_height(20), 40);
        assert_eq!(s.next_height(21), 40);
    }

    #[test]
    fn test_acceptance_fee() {
        assert_eq!(setting().acceptance_fee(100.0), 2.5);
    }

    #[test]
    fn test_tier_limits_are_inclusive() {
        let limits = TierLimits { min_bet: 1.0, max_bet: 10.0 };
        assert!(limits.check(1.0).is_ok());
        assert!(limits.check(10.0).is_ok());
        assert!(matches!(limits.check(10.5), Err(GameError::BetOutOfRange { .. })));
        assert!(limits.check(0.5).is_err());
    }

    #[test]
    fn test_round_timing_from_block_time() {
        let round = Round::open(
            StrategyKind::Lucky,
            StakeTier::Normal,
            20,
            10,
            &setting(),
            Duration::from_secs(3),
        );
        assert_eq!(round.end_time - round.start_time, 30_000);
        assert_eq!(round.lock_time - round.start_time, 24_000);
        assert_eq!(round.status, RoundStatus::Betting);
        assert!(round.is_open_for_bets(round.start_time));
        assert!(!round.is_open_for_bets(round.lock_time));
    }

    #[test]
    fn test_status_display_is_lowercase() {
        assert_eq!(RoundStatus::Settling.to_string(), "settling");
        assert_eq!(StakeTier::Mid.to_string(), "mid");
    }
}
