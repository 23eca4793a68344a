//! Bull-bull: dealer and player hands cut from the last five hash characters
//!
//! A hand's value is its digit sum mod 10. Zero is "Bull" and beats everything,
//! nine ("Nine") is next, the rest rank by value.

use super::{hand_value, mismatch, tail, BullSide, GameStrategy, Outcome, Payout, Prediction, StrategyKind};
use crate::errors::GameError;
use crate::games::types::Order;

const BULL_PERCENT: u32 = 1000;
const NINE_PERCENT: u32 = 900;
const WIN_PERCENT: u32 = 195;
const PREMIUM_FEE_PERCENT: u32 = 10;
const DRAW_REFUND_PERCENT: u32 = 99;

#[derive(Debug, Default, Clone, Copy)]
pub struct BullBullStrategy;

fn rank(value: u8) -> u8 {
    if value == 0 {
        10
    } else {
        value
    }
}

fn hand_name(value: u8) -> String {
    match value {
        0 => "bull".to_string(),
        9 => "nine".to_string(),
        v => v.to_string(),
    }
}

impl GameStrategy for BullBullStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BullBull
    }

    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError> {
        let cards = tail(hash, 5)?;
        let dealer = hand_value(&cards[0..3]);
        let player = hand_value(&cards[2..5]);

        let winner = match rank(dealer).cmp(&rank(player)) {
            std::cmp::Ordering::Greater => Some(BullSide::Dealer),
            std::cmp::Ordering::Less => Some(BullSide::Player),
            std::cmp::Ordering::Equal => None,
        };
        Ok(Outcome::BullBull { dealer, player, winner })
    }

    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError> {
        let (dealer, player, winner) = match outcome {
            Outcome::BullBull { dealer, player, winner } => (*dealer, *player, *winner),
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let pick = match order.prediction {
            Prediction::BullBull(pick) => pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let stake = order.delivery_amount;

        let Some(winner) = winner else {
            return Ok(Payout::refund(stake, DRAW_REFUND_PERCENT));
        };
        if pick != winner {
            return Ok(Payout::lose());
        }

        let winning_value = match winner {
            BullSide::Dealer => dealer,
            BullSide::Player => player,
        };
        Ok(match winning_value {
            0 => Payout::win(stake, BULL_PERCENT, PREMIUM_FEE_PERCENT),
            9 => Payout::win(stake, NINE_PERCENT, PREMIUM_FEE_PERCENT),
            _ => Payout::win(stake, WIN_PERCENT, 0),
        })
    }

    fn result_display(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::BullBull { dealer, player, winner } => {
                let verdict = match winner {
                    Some(BullSide::Dealer) => "dealer wins",
                    Some(BullSide::Player) => "player wins",
                    None => "draw",
                };
                format!("dealer {} / player {}: {}", hand_name(*dealer), hand_name(*player), verdict)
            }
            other => format!("unexpected {} outcome", other.kind()),
        }
    }
}
