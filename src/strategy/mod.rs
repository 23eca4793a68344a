//! Outcome and payout strategies
//!
//! A strategy is a stateless rule set: it derives an [`Outcome`] from a block
//! hash and prices an [`Order`] against that outcome. One instance is shared by
//! every room of its kind.

pub mod banker_player;
pub mod bull_bull;
pub mod lucky;
pub mod single_double;
pub mod small_big;

pub use banker_player::BankerPlayerTieStrategy;
pub use bull_bull::BullBullStrategy;
pub use lucky::LuckyStrategy;
pub use single_double::SingleDoubleStrategy;
pub use small_big::SmallBigStrategy;

use crate::errors::GameError;
use crate::games::types::{BetRequest, Order, RoundRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Game variant identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    SingleDouble,
    SmallBig,
    BullBull,
    BankerPlayerTie,
    Lucky,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::SingleDouble,
        StrategyKind::SmallBig,
        StrategyKind::BullBull,
        StrategyKind::BankerPlayerTie,
        StrategyKind::Lucky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SingleDouble => "single_double",
            StrategyKind::SmallBig => "small_big",
            StrategyKind::BullBull => "bull_bull",
            StrategyKind::BankerPlayerTie => "banker_player_tie",
            StrategyKind::Lucky => "lucky",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Small,
    Big,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BullSide {
    Dealer,
    Player,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BaccaratSide {
    Banker,
    Player,
    Tie,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LuckyPick {
    Lucky,
    Unlucky,
}

/// What a player bets on, one variant per strategy family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", content = "pick", rename_all = "snake_case")]
pub enum Prediction {
    SingleDouble(Parity),
    SmallBig(Size),
    BullBull(BullSide),
    BankerPlayerTie(BaccaratSide),
    Lucky(LuckyPick),
}

impl Prediction {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Prediction::SingleDouble(_) => StrategyKind::SingleDouble,
            Prediction::SmallBig(_) => StrategyKind::SmallBig,
            Prediction::BullBull(_) => StrategyKind::BullBull,
            Prediction::BankerPlayerTie(_) => StrategyKind::BankerPlayerTie,
            Prediction::Lucky(_) => StrategyKind::Lucky,
        }
    }
}

/// Result derived from a block hash
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum Outcome {
    SingleDouble { digit: u8, parity: Parity },
    SmallBig { digit: u8, size: Size },
    BullBull { dealer: u8, player: u8, winner: Option<BullSide> },
    BankerPlayerTie { banker: u8, player: u8, winner: BaccaratSide },
    Lucky { tail: String, pick: LuckyPick },
}

impl Outcome {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Outcome::SingleDouble { .. } => StrategyKind::SingleDouble,
            Outcome::SmallBig { .. } => StrategyKind::SmallBig,
            Outcome::BullBull { .. } => StrategyKind::BullBull,
            Outcome::BankerPlayerTie { .. } => StrategyKind::BankerPlayerTie,
            Outcome::Lucky { .. } => StrategyKind::Lucky,
        }
    }
}

/// How an order ends once priced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutKind {
    Win,
    Lose,
    /// Draw or push: part of the stake goes back
    Refund,
}

/// Amount owed to the player and the fee kept at settlement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payout {
    pub payout: f64,
    pub fee: f64,
    pub kind: PayoutKind,
}

impl Payout {
    pub fn lose() -> Self {
        Self { payout: 0.0, fee: 0.0, kind: PayoutKind::Lose }
    }

    /// `stake × percent / 100`, with `fee_percent` of the payout kept as fee
    pub fn win(stake: f64, percent: u32, fee_percent: u32) -> Self {
        let payout = scale(stake, percent);
        Self {
            payout,
            fee: scale(payout, fee_percent),
            kind: PayoutKind::Win,
        }
    }

    pub fn refund(stake: f64, percent: u32) -> Self {
        Self {
            payout: scale(stake, percent),
            fee: 0.0,
            kind: PayoutKind::Refund,
        }
    }

    /// What the player actually receives
    pub fn reward(&self) -> f64 {
        self.payout - self.fee
    }
}

// Integer percentages keep 1.95x exact for whole and half stakes.
fn scale(amount: f64, percent: u32) -> f64 {
    amount * percent as f64 / 100.0
}

/// Pluggable outcome and payout rules for one game variant
pub trait GameStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Derive the outcome from a block hash. Pure.
    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError>;

    /// Price one order against a parsed outcome. Deterministic.
    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError>;

    fn validate_bet(&self, bet: &BetRequest) -> Result<(), GameError> {
        if !bet.amount.is_finite() || bet.amount <= 0.0 {
            return Err(GameError::InvalidBetAmount(bet.amount));
        }
        if bet.prediction.kind() != self.kind() {
            return Err(GameError::InvalidPrediction {
                expected: self.kind(),
                found: bet.prediction.kind(),
            });
        }
        Ok(())
    }

    fn result_display(&self, outcome: &Outcome) -> String;

    fn before_settlement(&self, _round: &RoundRecord) {}

    fn after_settlement(&self, _round: &RoundRecord, _orders: &[Order]) {}
}

/// Strip an optional `0x` prefix
pub(crate) fn normalize_hash(hash: &str) -> &str {
    hash.strip_prefix("0x")
        .or_else(|| hash.strip_prefix("0X"))
        .unwrap_or(hash)
}

/// First decimal digit found scanning from the end of the hash
pub(crate) fn last_digit(hash: &str) -> Result<u8, GameError> {
    let body = normalize_hash(hash);
    body.bytes()
        .rev()
        .find(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .ok_or_else(|| GameError::MalformedHash {
            hash: hash.to_string(),
            reason: "no decimal digit",
        })
}

/// Final `len` characters of the hash
pub(crate) fn tail(hash: &str, len: usize) -> Result<&[u8], GameError> {
    let body = normalize_hash(hash).as_bytes();
    if body.len() < len || !body.is_ascii() {
        return Err(GameError::MalformedHash {
            hash: hash.to_string(),
            reason: "hash too short",
        });
    }
    Ok(&body[body.len() - len..])
}

/// Digit sum mod 10; non-digits count as zero
pub(crate) fn hand_value(chars: &[u8]) -> u8 {
    let sum: u32 = chars
        .iter()
        .filter(|c| c.is_ascii_digit())
        .map(|c| (c - b'0') as u32)
        .sum();
    (sum % 10) as u8
}

pub(crate) fn mismatch(expected: StrategyKind, found: StrategyKind) -> GameError {
    GameError::VariantMismatch { expected, found }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::order;

    const HASHES: [&str; 10] = [
        "0x4f2a9c1b0d7e3f5a6b8c9d0e1f2a3b4c5d6e7f8091a2b3c4d5e6f7a8b9c0d1e4",
        "4f2a9c1b0d7e3f5a6b8c9d0e1f2a3b4c5d6e7f8091a2b3c4d5e6f7a8b9c0d1e5",
        "0x0000000000000000000000000000000000000000000000000000000000012345",
        "98765432109876543210987654321098765432109876543210987654321098765",
        "0xabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdefabcdef7a",
        "0XABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF01234567",
        "0x00000000000000000000000000000000000000000000000000000000000a1b2c",
        "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        "0x7",
        "",
    ];

    fn strategies() -> Vec<Box<dyn GameStrategy>> {
        vec![
            Box::new(SingleDoubleStrategy),
            Box::new(SmallBigStrategy),
            Box::new(BullBullStrategy),
            Box::new(BankerPlayerTieStrategy),
            Box::new(LuckyStrategy),
        ]
    }

    fn every_prediction() -> Vec<Prediction> {
        vec![
            Prediction::SingleDouble(Parity::Odd),
            Prediction::SingleDouble(Parity::Even),
            Prediction::SmallBig(Size::Small),
            Prediction::SmallBig(Size::Big),
            Prediction::BullBull(BullSide::Dealer),
            Prediction::BullBull(BullSide::Player),
            Prediction::BankerPlayerTie(BaccaratSide::Banker),
            Prediction::BankerPlayerTie(BaccaratSide::Player),
            Prediction::BankerPlayerTie(BaccaratSide::Tie),
            Prediction::Lucky(LuckyPick::Lucky),
            Prediction::Lucky(LuckyPick::Unlucky),
        ]
    }

    #[test]
    fn test_outcomes_and_payouts_are_deterministic() {
        for strategy in strategies() {
            let predictions: Vec<Prediction> = every_prediction()
                .into_iter()
                .filter(|p| p.kind() == strategy.kind())
                .collect();
            assert!(!predictions.is_empty());

            for hash in HASHES {
                let first = strategy.parse_result(hash);
                assert_eq!(first, strategy.parse_result(hash), "{} on {:?}", strategy.kind(), hash);
                let Ok(outcome) = first else { continue };
                assert_eq!(outcome.kind(), strategy.kind());

                for prediction in &predictions {
                    let placed = order(*prediction, 100.0);
                    let payout = strategy.calculate_payout(&placed, &outcome);
                    assert!(payout.is_ok(), "{:?} on {:?}", prediction, hash);
                    assert_eq!(payout, strategy.calculate_payout(&placed, &outcome));
                }
            }
        }
    }

    #[test]
    fn test_malformed_hashes_are_rejected_by_every_strategy() {
        for strategy in strategies() {
            assert!(matches!(strategy.parse_result(""), Err(GameError::MalformedHash { .. })));
        }
    }

    #[test]
    fn test_last_digit_scans_from_end() {
        assert_eq!(last_digit("0xab7cdef").unwrap(), 7);
        assert_eq!(last_digit("12ab").unwrap(), 2);
        assert!(matches!(last_digit("0xabcdef"), Err(GameError::MalformedHash { .. })));
        assert!(last_digit("").is_err());
    }

    #[test]
    fn test_prefix_is_ignored() {
        assert_eq!(tail("0x7a", 2).unwrap(), b"7a");
        assert!(tail("0x7", 2).is_err());
    }

    #[test]
    fn test_hand_value_ignores_letters() {
        assert_eq!(hand_value(b"123"), 6);
        assert_eq!(hand_value(b"9a9"), 8);
        assert_eq!(hand_value(b"abc"), 0);
    }

    #[test]
    fn test_payout_math_is_exact() {
        assert_eq!(Payout::win(100.0, 195, 0).payout, 195.0);
        assert_eq!(Payout::win(50.0, 195, 0).payout, 97.5);

        let bull = Payout::win(100.0, 1000, 10);
        assert_eq!(bull.payout, 1000.0);
        assert_eq!(bull.fee, 100.0);
        assert_eq!(bull.reward(), 900.0);
    }

    #[test]
    fn test_prediction_wire_format() {
        let json = serde_json::to_string(&Prediction::SingleDouble(Parity::Odd)).unwrap();
        assert_eq!(json, r#"{"game":"single_double","pick":"odd"}"#);
        let back: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), StrategyKind::SingleDouble);
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in StrategyKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.to_string());
        }
    }
}
