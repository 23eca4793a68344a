//! Round settlement
//!
//! The settlement worker and out-of-band retries both funnel into
//! [`GameRoom::try_settle`], which holds the room's settlement mutex and checks
//! `settled` first, so a round pays out at most once.

use crate::common::task::guarded;
use crate::errors::{GameError, OracleError, PersistenceError};
use crate::games::room::GameRoom;
use crate::games::types::{Order, OrderStatus, Round, RoundResult, RoundStatus};
use crate::strategy::{Payout, PayoutKind};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Longest a settlement waits for accepted orders to finish their writes
const ORDER_WRITE_WAIT: Duration = Duration::from_secs(2);
const ORDER_WRITE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub(crate) enum SettlementFailure {
    #[error("block {height} unavailable: {source}")]
    Fetch { height: u64, source: OracleError },

    #[error("cannot settle against block hash {hash}: {error}")]
    Outcome { hash: String, error: GameError },

    #[error("settlement batch rejected: {0}")]
    Persistence(PersistenceError),

    #[error("{pending} orders for block {height} still being written")]
    Unconfirmed { height: u64, pending: usize },
}

impl SettlementFailure {
    /// Fetch and storage problems may clear up; a bad hash will not
    fn is_retryable(&self) -> bool {
        !matches!(self, SettlementFailure::Outcome { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    Settled,
    AlreadySettled,
    Missing,
}

fn apply_payout(mut order: Order, payout: &Payout) -> Order {
    order.fee += payout.fee;
    order.reward_amount = payout.reward();
    order.status = match payout.kind {
        PayoutKind::Win => OrderStatus::Won,
        PayoutKind::Lose => OrderStatus::Lost,
        PayoutKind::Refund => OrderStatus::Refunded,
    };
    order
}

impl GameRoom {
    /// Settle the round targeting `height`; called by the settlement worker
    pub async fn process_settlement(self: &Arc<Self>, height: u64) {
        debug!(variant = %self.variant(), tier = %self.tier(), height, "processing settlement");
        self.handle_block_settlement(height).await;
    }

    async fn handle_block_settlement(self: &Arc<Self>, height: u64) {
        match self.try_settle(height).await {
            Ok(Attempt::Settled) | Ok(Attempt::AlreadySettled) => {}
            Ok(Attempt::Missing) => {
                warn!(variant = %self.variant(), tier = %self.tier(), height, "no round targets this height");
            }
            Err(failure) => {
                warn!(
                    variant = %self.variant(),
                    tier = %self.tier(),
                    height,
                    error = %failure,
                    "settlement failed; opening next round"
                );
                self.fail_and_rotate(height, |round| mark_failure(round, &failure)).await;

                if failure.is_retryable() && !self.retry_backoff.is_empty() {
                    let room = Arc::clone(self);
                    let retry = tokio::spawn(async move {
                        guarded("room-settlement-retry", room.retry_settlement(height)).await;
                    });
                    self.track(retry).await;
                }
            }
        }
    }

    /// Settle `height` with panic isolation; a panicking attempt parks the
    /// round with an error and the room moves on to a new round.
    pub(crate) async fn settle_isolated(self: &Arc<Self>, height: u64) {
        if guarded("room-settlement", self.process_settlement(height)).await {
            return;
        }
        self.fail_and_rotate(height, |round| {
            round.error = Some("settlement panicked".to_string());
        })
        .await;
    }

    /// Record a failed settlement on the round and, if it is still the
    /// current round, supersede it so the room keeps taking bets.
    async fn fail_and_rotate<F>(&self, height: u64, mark: F)
    where
        F: FnOnce(&mut Round),
    {
        self.counters.settlement_failures.fetch_add(1, Ordering::Relaxed);
        let (updated, opened) = {
            let mut rounds = self.rounds.write().await;
            let updated = rounds.find_mut(height).map(|round| {
                mark(round);
                round.record()
            });
            let is_current = rounds
                .current
                .as_ref()
                .map_or(false, |round| round.target_height == height);
            let opened = is_current.then(|| {
                let latest = self.oracle.latest_height();
                self.rotate(&mut rounds, latest.max(height))
            });
            (updated, opened)
        };
        if let Some(record) = updated {
            self.persist_round_update(&record).await;
        }
        if let Some(record) = opened {
            self.persist_new_round(&record).await;
        }
    }

    /// Wait until every accepted order of the round has been written or rolled back
    async fn await_order_writes(&self, height: u64) -> Result<(), SettlementFailure> {
        let deadline = Instant::now() + ORDER_WRITE_WAIT;
        loop {
            let pending = {
                let rounds = self.rounds.read().await;
                rounds.find(height).map_or(0, |round| round.unconfirmed.len())
            };
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SettlementFailure::Unconfirmed { height, pending });
            }
            tokio::time::sleep(ORDER_WRITE_POLL).await;
        }
    }

    /// One settlement attempt, serialized with every other attempt in this room
    pub(crate) async fn try_settle(&self, height: u64) -> Result<Attempt, SettlementFailure> {
        let _serial = self.settle_lock.lock().await;
        self.await_order_writes(height).await?;

        let (record, orders) = {
            let rounds = self.rounds.read().await;
            let Some(round) = rounds.find(height) else {
                return Ok(Attempt::Missing);
            };
            if round.settled {
                return Ok(Attempt::AlreadySettled);
            }
            (round.record(), round.orders())
        };

        let block = self
            .oracle
            .get_block(height)
            .await
            .map_err(|source| SettlementFailure::Fetch { height, source })?;

        self.strategy.before_settlement(&record);

        let outcome = self
            .strategy
            .parse_result(&block.hash)
            .map_err(|error| SettlementFailure::Outcome { hash: block.hash.clone(), error })?;
        let display = self.strategy.result_display(&outcome);

        let mut settled = Vec::with_capacity(orders.len());
        for order in orders {
            let payout = self
                .strategy
                .calculate_payout(&order, &outcome)
                .map_err(|error| SettlementFailure::Outcome { hash: block.hash.clone(), error })?;
            settled.push(apply_payout(order, &payout));
        }

        if !settled.is_empty() {
            let report = self
                .store
                .settle_player_orders(&settled)
                .await
                .map_err(SettlementFailure::Persistence)?;
            if !report.is_complete() {
                let partial = PersistenceError::PartialSettlement { failed: report.failed };
                error!(round_id = %record.id, height, error = %partial, "settled orders not fully persisted");
            }
        }

        let result = RoundResult {
            block_height: block.number,
            block_hash: block.hash.clone(),
            outcome: Some(outcome),
            display,
            error: None,
        };

        let (final_record, opened) = {
            let mut rounds = self.rounds.write().await;
            let latest = self.oracle.latest_height();
            let Some(round) = rounds.find_mut(height) else {
                return Ok(Attempt::Missing);
            };
            round.status = RoundStatus::Completed;
            round.settled = true;
            round.result = Some(result);
            round.error = None;
            for order in &settled {
                if let Some(mut entry) = round.bets.get_mut(&order.order_id) {
                    *entry = order.clone();
                }
            }
            let final_record = round.record();

            let newer_than_last = rounds
                .last_settled
                .as_ref()
                .map_or(true, |last| last.target_height < height);
            if newer_than_last {
                rounds.last_settled = Some(final_record.clone());
            }

            let is_current = rounds
                .current
                .as_ref()
                .map_or(false, |round| round.target_height == height);
            let opened = is_current.then(|| self.rotate(&mut rounds, latest.max(height)));
            (final_record, opened)
        };

        self.counters.rounds_settled.fetch_add(1, Ordering::Relaxed);
        info!(
            variant = %final_record.variant,
            tier = %final_record.tier,
            round_id = %final_record.id,
            height,
            hash = %block.hash,
            orders = settled.len(),
            "round settled"
        );

        self.persist_round_update(&final_record).await;
        if let Some(record) = opened {
            self.persist_new_round(&record).await;
        }
        self.strategy.after_settlement(&final_record, &settled);

        Ok(Attempt::Settled)
    }

    /// Re-attempt a failed settlement on the configured backoff schedule
    pub(crate) async fn retry_settlement(self: Arc<Self>, height: u64) {
        let mut shutdown = self.shutdown.clone();
        let schedule = self.retry_backoff.clone();
        let mut last_error = String::new();

        for (attempt, delay) in schedule.iter().enumerate() {
            tokio::select! {
                _ = tokio::time::sleep(*delay) => {}
                _ = shutdown.changed() => {
                    debug!(height, "shutdown during settlement retry");
                    return;
                }
            }
            if *shutdown.borrow() {
                return;
            }

            {
                let mut rounds = self.rounds.write().await;
                match rounds.find_mut(height) {
                    Some(round) if !round.settled => round.retry_count += 1,
                    _ => return,
                }
            }

            match self.try_settle(height).await {
                Ok(Attempt::Settled) => {
                    info!(variant = %self.variant(), tier = %self.tier(), height, attempt = attempt + 1, "settled on retry");
                    return;
                }
                Ok(_) => return,
                Err(failure) => {
                    warn!(
                        variant = %self.variant(),
                        tier = %self.tier(),
                        height,
                        attempt = attempt + 1,
                        error = %failure,
                        "settlement retry failed"
                    );
                    if !failure.is_retryable() {
                        self.record_failure(height, &failure).await;
                        return;
                    }
                    last_error = failure.to_string();
                }
            }
        }

        let message = format!("settlement failed after {} retries: {}", schedule.len(), last_error);
        let record = {
            let mut rounds = self.rounds.write().await;
            match rounds.find_mut(height) {
                Some(round) if !round.settled => {
                    round.error = Some(message);
                    round.record()
                }
                _ => return,
            }
        };
        self.counters.settlement_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            variant = %record.variant,
            tier = %record.tier,
            round_id = %record.id,
            height,
            error = record.error.as_deref().unwrap_or_default(),
            "giving up on settlement; round left in settling"
        );
        self.persist_round_update(&record).await;
    }

    async fn record_failure(&self, height: u64, failure: &SettlementFailure) {
        let record = {
            let mut rounds = self.rounds.write().await;
            rounds.find_mut(height).map(|round| {
                mark_failure(round, failure);
                round.record()
            })
        };
        self.counters.settlement_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(record) = record {
            self.persist_round_update(&record).await;
        }
    }
}

fn mark_failure(round: &mut Round, failure: &SettlementFailure) {
    round.error = Some(failure.to_string());
    if let SettlementFailure::Outcome { hash, error } = failure {
        round.result = Some(RoundResult {
            block_height: round.target_height,
            block_hash: hash.clone(),
            outcome: None,
            display: String::new(),
            error: Some(error.to_string()),
        });
    }
}
