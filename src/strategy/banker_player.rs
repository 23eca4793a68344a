//! Banker / player / tie on the last five hash characters

use super::{hand_value, mismatch, tail, BaccaratSide, GameStrategy, Outcome, Payout, Prediction, StrategyKind};
use crate::errors::GameError;
use crate::games::types::Order;

const WIN_PERCENT: u32 = 195;
const TIE_PERCENT: u32 = 800;
const PUSH_REFUND_PERCENT: u32 = 50;

#[derive(Debug, Default, Clone, Copy)]
pub struct BankerPlayerTieStrategy;

impl GameStrategy for BankerPlayerTieStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BankerPlayerTie
    }

    fn parse_result(&self, hash: &str) -> Result<Outcome, GameError> {
        let cards = tail(hash, 5)?;
        let banker = hand_value(&cards[0..2]);
        let player = hand_value(&cards[3..5]);

        let winner = match banker.cmp(&player) {
            std::cmp::Ordering::Greater => BaccaratSide::Banker,
            std::cmp::Ordering::Less => BaccaratSide::Player,
            std::cmp::Ordering::Equal => BaccaratSide::Tie,
        };
        Ok(Outcome::BankerPlayerTie { banker, player, winner })
    }

    fn calculate_payout(&self, order: &Order, outcome: &Outcome) -> Result<Payout, GameError> {
        let winner = match outcome {
            Outcome::BankerPlayerTie { winner, .. } => *winner,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let pick = match order.prediction {
            Prediction::BankerPlayerTie(pick) => pick,
            other => return Err(mismatch(self.kind(), other.kind())),
        };
        let stake = order.delivery_amount;

        Ok(match (pick, winner) {
            (BaccaratSide::Tie, BaccaratSide::Tie) => Payout::win(stake, TIE_PERCENT, 0),
            (_, BaccaratSide::Tie) => Payout::refund(stake, PUSH_REFUND_PERCENT),
            (pick, winner) if pick == winner => Payout::win(stake, WIN_PERCENT, 0),
            _ => Payout::lose(),
        })
    }

    fn result_display(&self, outcome: &Outcome) -> String {
        match outcome {
            Outcome::BankerPlayerTie { banker, player, winner } => {
                let verdict = match winner {
                    BaccaratSide::Banker => "banker",
                    BaccaratSide::Player => "player",
                    BaccaratSide::Tie => "tie",
                };
                format!("banker {} / player {}: {}", banker, player, verdict)
            }
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
    fn test_hands_skip_the_middle_character() {
        // banker 9+8 = 7, player 2+3 = 5; the middle 'f' belongs to neither
        let outcome = BankerPlayerTieStrategy.parse_result("0x98f23").unwrap();
        assert_eq!(
            outcome,
            Outcome::BankerPlayerTie { banker: 7, player: 5, winner: BaccaratSide::Banker }
        );
    }

    #[test]
    fn test_tie_pays_eight_times() {
        let outcome = BankerPlayerTieStrategy.parse_result("12a30").unwrap();
        let payout = BankerPlayerTieStrategy
            .calculate_payout(&order(Prediction::BankerPlayerTie(BaccaratSide::Tie), 10.0), &outcome)
            .unwrap();
        assert_eq!(payout.payout, 80.0);
        assert_eq!(payout.kind, PayoutKind::Win);
    }

    #[test]
    fn test_side_bets_pushed_by_tie() {
        let outcome = BankerPlayerTieStrategy.parse_result("55x19").unwrap();
        let payout = BankerPlayerTieStrategy
            .calculate_payout(&order(Prediction::BankerPlayerTie(BaccaratSide::Player), 10.0), &outcome)
            .unwrap();
        assert_eq!(payout.kind, PayoutKind::Refund);
        assert_eq!(payout.payout, 5.0);
    }

    #[test]
    fn test_player_win() {
        let outcome = BankerPlayerTieStrategy.parse_result("00018").unwrap();
        assert_eq!(BankerPlayerTieStrategy.result_display(&outcome), "banker 0 / player 9: player");

        let strategy = BankerPlayerTieStrategy;
        let win = strategy
            .calculate_payout(&order(Prediction::BankerPlayerTie(BaccaratSide::Player), 100.0), &outcome)
            .unwrap();
        assert_eq!(win.payout, 195.0);
        let lose = strategy
            .calculate_payout(&order(Prediction::BankerPlayerTie(BaccaratSide::Banker), 100.0), &outcome)
            .unwrap();
        assert_eq!(lose, Payout::lose());
    }
}
