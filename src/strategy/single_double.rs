//! Odd/even on the last decimal digit of the hash

use super::{last_digit, mismatch, GameStrategy, Outcome, Parity, Payout, Prediction, StrategyKind};
use crate::errors::GameError;
use crate::games::types::Order;

const WIN_PERCENT: u32 = 195;

#[derive(Debug, Default, Clone, Copy)]
pub struct SingleDoubleStrategy;

impl GameStrategy for SingleDoubleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SingleDouble
    }

    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError> {
        let digit = last_digit(hash)?;
        let parity = if digit % 2 == 1 { Parity::Odd } else { Parity::Even };
        Ok(Outcome::SingleDouble { digit, parity })
    }

    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError> {
        let parity = match outcome {
            Outcome::SingleDouble { parity, .. } => *parity,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let pick = match order.prediction {
            Prediction::SingleDouble(pick) => pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };

        if pick == parity {
            Ok(Payout::win(order.delivery_amount, WIN_PERCENT, 0))
        } else {
            Ok(Payout::lose())
        }
    }

    fn result_display(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::SingleDouble { digit, parity: Parity::Odd } => format!("{} odd", digit),
            Outcome::SingleDouble { digit, parity: Parity::Even } => format!("{} even", digit),
            other => format!("unexpected {} outcome", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::order;
    use crate::strategy::PayoutKind;

    #[test]
    fn test_hash_ending_in_seven_is_odd() {
        let strategy = SingleDoubleStrategy;
        let outcome = strategy.parse_result("0x9f3e7").unwrap();
        assert_eq!(outcome, Outcome::SingleDouble { digit: 7, parity: Parity::Odd });

        let payout = strategy
            .calculate_payout(&order(Prediction::SingleDouble(Parity::Odd), 100.0), &outcome)
            .unwrap();
        assert_eq!(payout.payout, 195.0);
        assert_eq!(payout.fee, 0.0);
        assert_eq!(payout.kind, PayoutKind::Win);
    }

    #[test]
    fn test_trailing_letters_are_skipped() {
        let strategy = SingleDoubleStrategy;
        let outcome = strategy.parse_result("00ab4cdef").unwrap();
        assert_eq!(outcome, Outcome::SingleDouble { digit: 4, parity: Parity::Even });
        assert_eq!(strategy.result_display(&outcome), "4 even");
    }

    #[test]
    fn test_parse_is_pure() {
        let strategy = SingleDoubleStrategy;
        let hash = "0x4b1c9a";
        assert_eq!(strategy.parse_result(hash).unwrap(), strategy.parse_result(hash).unwrap());
    }

    #[test]
    fn test_losing_pick_pays_nothing() {
        let strategy = SingleDoubleStrategy;
        let outcome = strategy.parse_result("8").unwrap();
        let payout = strategy
            .calculate_payout(&order(Prediction::SingleDouble(Parity::Odd), 100.0), &outcome)
            .unwrap();
        assert_eq!(payout, Payout::lose());
    }

    #[test]
    fn test_hash_without_digit_is_malformed() {
        assert!(matches!(
            SingleDoubleStrategy.parse_result("0xabcdef"),
            Err(GameError::MalformedHash { .. })
        ));
    }

    #[test]
    fn test_foreign_outcome_is_rejected() {
        let outcome = Outcome::SmallBig { digit: 3, size: crate::strategy::Size::Small };
        let result = SingleDoubleStrategy
            .calculate_payout(&order(Prediction::SingleDouble(Parity::Odd), 10.0), &outcome);
        assert!(matches!(result, Err(GameError::VariantMismatch { .. })));
    }
}
