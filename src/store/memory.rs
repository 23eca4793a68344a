//! In-memory round store for tests and ephemeral runs

use super::{RoundStore, SettleReport};
use crate::errors::PersistenceError;
use crate::games::types::{Order, RoundRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    rounds: DashMap<String, RoundRecord>,
    orders: DashMap<String, Order>,
    fail_order_writes: AtomicBool,
    fail_settlement: AtomicBool,
    settle_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round(&self, id: &str) -> Option<RoundRecord> {
        self.rounds.get(id).map(|r| r.value().clone())
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|o| o.value().clone())
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn orders_for_round(&self, round_id: &str) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|o| o.round_id == round_id)
            .map(|o| o.value().clone())
            .collect()
    }

    /// Make `create_order` and `update_order` fail
    pub fn set_fail_order_writes(&self, fail: bool) {
        self.fail_order_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `settle_player_orders` fail as a whole
    pub fn set_fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    /// Number of non-empty settlement batches received
    pub fn settle_calls(&self) -> u64 {
        self.settle_calls.load(Ordering::SeqCst)
    }

    fn check_order_writes(&self) -> Result<(), PersistenceError> {
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("order writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoundStore for MemoryStore {
    async fn insert_round(&self, round: &RoundRecord) -> Result<(), PersistenceError> {
        self.rounds.insert(round.id.clone(), round.clone());
        Ok(())
    }

    async fn update_round(&self, round: &RoundRecord) -> Result<(), PersistenceError> {
        self.rounds.insert(round.id.clone(), round.clone());
        Ok(())
    }

    async fn create_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.check_order_writes()?;
        self.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.check_order_writes()?;
        self.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn settle_player_orders(&self, orders: &[Order]) -> Result<SettleReport, PersistenceError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("settlement disabled".to_string()));
        }
        if !orders.is_empty() {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
        }

        let mut report = SettleReport::default();
        for order in orders {
            match self.update_order(order).await {
                Ok(()) => report.settled += 1,
                Err(e) => {
                    tracing::warn!(order_id = %order.order_id, error = %e, "order settlement write failed");
                    report.failed.push(order.order_id.clone());
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{OrderStatus, StakeTier};
    use crate::strategy::{LuckyPick, Prediction, StrategyKind};

    fn order(id: &str) -> Order {
        Order {
            order_id: id.to_string(),
            uid: "u".to_string(),
            round_id: "r".to_string(),
            variant: StrategyKind::Lucky,
            tier: StakeTier::Normal,
            target_height: 20,
            prediction: Prediction::Lucky(LuckyPick::Lucky),
            bet_amount: 10.0,
            delivery_amount: 10.0,
            fee: 0.0,
            reward_amount: 0.0,
            status: OrderStatus::Pending,
            created_at: 0,
            end_time: 0,
        }
    }

    #[tokio::test]
    async fn test_orders_round_trip() {
        let store = MemoryStore::new();
        store.create_order(&order("a")).await.unwrap();
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.orders_for_round("r").len(), 1);
        assert!(store.order("a").is_some());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.set_fail_order_writes(true);
        assert!(store.create_order(&order("a")).await.is_err());

        let report = store.settle_player_orders(&[order("a"), order("b")]).await.unwrap();
        assert_eq!(report.failed, vec!["a".to_string(), "b".to_string()]);
        assert!(!report.is_complete());

        store.set_fail_settlement(true);
        assert!(store.settle_player_orders(&[order("a")]).await.is_err());
    }
}
