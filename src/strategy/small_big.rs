//! Small (0-4) or big (5-9) on the last decimal digit of the hash

use super::{last_digit, mismatch, GameStrategy, Outcome, Payout, Prediction, Size, StrategyKind};
use crate::errors::GameError;
use crate::games::types::Order;

const WIN_PERCENT: u32 = 195;

#[derive(Debug, Default, Clone, Copy)]
pub struct SmallBigStrategy;

impl GameStrategy for SmallBigStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SmallBig
    }

    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError> {
        let digit = last_digit(hash)?;
        let size = if digit < 5 { Size::Small } else { Size::Big };
        Ok(Outcome::SmallBig { digit, size })
    }

    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError> {
        let size = match outcome {
            Outcome::SmallBig { size, .. } => *size,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let pick = match order.prediction {
            Prediction::SmallBig(pick) => pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };

        if pick == size {
            Ok(Payout::win(order.delivery_amount, WIN_PERCENT, 0))
        } else {
            Ok(Payout::lose())
        }
    }

    fn result_display(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::SmallBig { digit, size: Size::Small } => format!("{} small", digit),
            Outcome::SmallBig { digit, size: Size::Big } => format!("{} big", digit),
            other => format!("unexpected {} outcome", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::order;

    #[test]
    fn test_boundary_digits() {
        let strategy = SmallBigStrategy;
        assert_eq!(
            strategy.parse_result("0xff4").unwrap(),
            Outcome::SmallBig { digit: 4, size: Size::Small }
        );
        assert_eq!(
            strategy.parse_result("0xff5").unwrap(),
            Outcome::SmallBig { digit: 5, size: Size::Big }
        );
        assert_eq!(
            strategy.parse_result("0x0ff").unwrap(),
            Outcome::SmallBig { digit: 0, size: Size::Small }
        );
    }

    #[test]
    fn test_boundary_payouts() {
        let strategy = SmallBigStrategy;
        let four = strategy.parse_result("0xab4").unwrap();
        let five = strategy.parse_result("0xab5").unwrap();
        let small = order(Prediction::SmallBig(Size::Small), 100.0);
        let big = order(Prediction::SmallBig(Size::Big), 100.0);

        assert_eq!(strategy.calculate_payout(&small, &four).unwrap().payout, 195.0);
        assert_eq!(strategy.calculate_payout(&big, &four).unwrap(), Payout::lose());
        assert_eq!(strategy.calculate_payout(&big, &five).unwrap().payout, 195.0);
        assert_eq!(strategy.calculate_payout(&small, &five).unwrap(), Payout::lose());
    }

    #[test]
    fn test_big_win_pays_195_percent() {
        let strategy = SmallBigStrategy;
        let outcome = strategy.parse_result("a9").unwrap();
        let payout = strategy
            .calculate_payout(&order(Prediction::SmallBig(Size::Big), 40.0), &outcome)
            .unwrap();
        assert_eq!(payout.payout, 78.0);
        assert_eq!(payout.reward(), 78.0);
    }

    #[test]
    fn test_foreign_prediction_is_rejected() {
        let outcome = SmallBigStrategy.parse_result("1").unwrap();
        let result = SmallBigStrategy
            .calculate_payout(&order(Prediction::Lucky(crate::strategy::LuckyPick::Lucky), 10.0), &outcome);
        assert!(matches!(result, Err(GameError::VariantMismatch { .. })));
    }
}
