//! Lucky: the hash ends in a digit followed by a letter

use super::{mismatch, tail, GameStrategy, LuckyPick, Outcome, Payout, Prediction, StrategyKind};
use crate::errors::GameError;
use crate::games::types::Order;

const WIN_PERCENT: u32 = 195;

#[derive(Debug, Default, Clone, Copy)]
pub struct LuckyStrategy;

impl GameStrategy for LuckyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lucky
    }

    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError> {
        let last_two = tail(hash, 2)?;
        let pick = if last_two[0].is_ascii_digit() && last_two[1].is_ascii_alphabetic() {
            LuckyPick::Lucky
        } else {
            LuckyPick::Unlucky
        };
        Ok(Outcome::Lucky {
            tail: String::from_utf8_lossy(last_two).into_owned(),
            pick,
        })
    }

    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError> {
        let result = match outcome {
            Outcome::Lucky { pick, .. } => *pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let pick = match order.prediction {
            Prediction::Lucky(pick) => pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };

        if pick == result {
            Ok(Payout::win(order.delivery_amount, WIN_PERCENT, 0))
        } else {
            Ok(Payout::lose())
        }
    }

    fn result_display(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::Lucky { tail, pick: LuckyPick::Lucky } => format!("{} lucky", tail),
            Outcome::Lucky { tail, pick: LuckyPick::Unlucky } => format!("{} unlucky", tail),
            other => format!("unexpected {} outcome", other.kind()),
        }
    }
}
