//! Game room
//!
//! One room runs the rounds of one game variant at one stake tier. It follows
//! the oracle's height feed, locks and hands rounds to its settlement worker,
//! and accepts bets into the open round.

use crate::common::task::guarded;
use crate::common::types::{current_timestamp_ms, current_timestamp_nanos};
use crate::errors::GameError;
use crate::games::types::{
    BetRequest, Order, OrderStatus, RoomSetting, RoomSnapshot, RoomStats, Round, RoundRecord,
    RoundStatus, StakeTier, TierLimits,
};
use crate::oracle::{BlockOracle, HeightSubscription};
use crate::store::RoundStore;
use crate::strategy::{GameStrategy, StrategyKind};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything a room needs from the outside
#[derive(Clone)]
pub struct RoomContext {
    pub strategy: Arc<dyn GameStrategy>,
    pub oracle: Arc<BlockOracle>,
    pub store: Arc<dyn RoundStore>,
    pub tier: StakeTier,
    pub setting: RoomSetting,
    pub limits: TierLimits,
    pub block_time: Duration,
    pub retry_backoff: Vec<Duration>,
    pub history_capacity: usize,
    pub settlement_queue_depth: usize,
    pub shutdown: watch::Receiver<bool>,
}

/// Rounds owned by a room, guarded by one lock
#[derive(Default)]
pub(crate) struct RoomRounds {
    pub(crate) current: Option<Round>,
    pub(crate) last_settled: Option<RoundRecord>,
    pub(crate) history: BTreeMap<u64, Round>,
    pub(crate) highest_target: u64,
}

impl RoomRounds {
    pub(crate) fn find(&self, target_height: u64) -> Option<&Round> {
        match &self.current {
            Some(round) if round.target_height == target_height => Some(round),
            _ => self.history.get(&target_height),
        }
    }

    pub(crate) fn find_mut(&mut self, target_height: u64) -> Option<&mut Round> {
        match &mut self.current {
            Some(round) if round.target_height == target_height => Some(round),
            _ => self.history.get_mut(&target_height),
        }
    }
}

#[derive(Default)]
pub(crate) struct RoomCounters {
    pub(crate) bets_accepted: AtomicU64,
    pub(crate) bets_rejected: AtomicU64,
    pub(crate) rounds_settled: AtomicU64,
    pub(crate) settlement_failures: AtomicU64,
}

pub struct GameRoom {
    pub(crate) strategy: Arc<dyn GameStrategy>,
    pub(crate) oracle: Arc<BlockOracle>,
    pub(crate) store: Arc<dyn RoundStore>,
    tier: StakeTier,
    setting: RoomSetting,
    limits: TierLimits,
    block_time: Duration,
    pub(crate) retry_backoff: Vec<Duration>,
    history_capacity: usize,
    pub(crate) rounds: RwLock<RoomRounds>,
    /// Serializes the settlement worker and out-of-band retries
    pub(crate) settle_lock: Mutex<()>,
    settlement_tx: mpsc::Sender<u64>,
    settlement_rx: Mutex<Option<mpsc::Receiver<u64>>>,
    order_clock: AtomicU64,
    pub(crate) counters: RoomCounters,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GameRoom {
    pub fn new(ctx: RoomContext) -> Self {
        let (settlement_tx, settlement_rx) = mpsc::channel(ctx.settlement_queue_depth.max(1));
        Self {
            strategy: ctx.strategy,
            oracle: ctx.oracle,
            store: ctx.store,
            tier: ctx.tier,
            setting: ctx.setting,
            limits: ctx.limits,
            block_time: ctx.block_time,
            retry_backoff: ctx.retry_backoff,
            history_capacity: ctx.history_capacity,
            rounds: RwLock::new(RoomRounds::default()),
            settle_lock: Mutex::new(()),
            settlement_tx,
            settlement_rx: Mutex::new(Some(settlement_rx)),
            order_clock: AtomicU64::new(0),
            counters: RoomCounters::default(),
            shutdown: ctx.shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn variant(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn tier(&self) -> StakeTier {
        self.tier
    }

    /// Open the first round and spawn the height listener and settlement worker
    pub async fn start(self: &Arc<Self>) -> Result<(), GameError> {
        let settlement_rx = self
            .settlement_rx
            .lock()
            .await
            .take()
            .ok_or(GameError::RoomAlreadyStarted)?;

        // Subscribe first so no height between the read below and the listener is lost.
        let subscription = self.oracle.subscribe_height();

        match self.oracle.current_height() {
            Ok(height) => self.open_round(height).await,
            Err(e) => debug!(
                variant = %self.variant(),
                tier = %self.tier,
                reason = %e,
                "no chain head yet; first round opens on the first height"
            ),
        }

        let listener = tokio::spawn(Arc::clone(self).run_listener(subscription));
        let worker = tokio::spawn(Arc::clone(self).run_settlement_worker(settlement_rx));
        self.tasks.lock().await.extend([listener, worker]);

        info!(variant = %self.variant(), tier = %self.tier, "game room started");
        Ok(())
    }

    /// Wait for the room's background tasks to stop
    pub async fn join(&self) {
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(variant = %self.variant(), tier = %self.tier, error = %e, "room task ended abnormally");
            }
        }
    }

    async fn run_listener(self: Arc<Self>, mut subscription: HeightSubscription) {
        let mut shutdown = self.shutdown.clone();
        let mut lock_check = tokio::time::interval(self.block_time.min(Duration::from_secs(1)));
        lock_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                height = subscription.recv() => {
                    let Some(height) = height else {
                        warn!(variant = %self.variant(), tier = %self.tier, "height feed closed");
                        break;
                    };
                    guarded("room-height", self.on_height(height)).await;
                }
                _ = lock_check.tick() => {
                    guarded("room-lock", self.check_lock()).await;
                }
            }
        }
        debug!(variant = %self.variant(), tier = %self.tier, "height listener stopped");
    }

    async fn run_settlement_worker(self: Arc<Self>, mut settlement_rx: mpsc::Receiver<u64>) {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                height = settlement_rx.recv() => {
                    let Some(height) = height else { break };
                    self.settle_isolated(height).await;
                }
            }
        }
        debug!(variant = %self.variant(), tier = %self.tier, "settlement worker stopped");
    }

    /// React to a new chain height
    pub async fn on_height(&self, height: u64) {
        let mut queued = None;
        {
            let mut rounds = self.rounds.write().await;
            if rounds.current.is_none() {
                drop(rounds);
                self.open_round(height).await;
                return;
            }
            let Some(round) = rounds.current.as_mut() else { return };

            if round.status == RoundStatus::Betting && current_timestamp_ms() >= round.lock_time {
                round.status = RoundStatus::Locked;
                info!(variant = %round.variant, tier = %round.tier, target = round.target_height, "betting locked");
            }

            if height >= round.target_height
                && matches!(round.status, RoundStatus::Betting | RoundStatus::Locked)
            {
                round.status = RoundStatus::Settling;
                info!(
                    variant = %round.variant,
                    tier = %round.tier,
                    target = round.target_height,
                    height,
                    bets = round.bets.len(),
                    "target reached; settling"
                );
                queued = Some(round.target_height);
            }
        }

        if let Some(target) = queued {
            if self.settlement_tx.send(target).await.is_err() {
                error!(variant = %self.variant(), tier = %self.tier, target, "settlement worker gone");
            }
        }
    }

    /// Lock the open round once its wall-clock lock time passes
    async fn check_lock(&self) {
        let now = current_timestamp_ms();
        let mut rounds = self.rounds.write().await;
        if let Some(round) = rounds.current.as_mut() {
            if round.status == RoundStatus::Betting && now >= round.lock_time {
                round.status = RoundStatus::Locked;
                info!(variant = %round.variant, tier = %round.tier, target = round.target_height, "betting locked");
            }
        }
    }

    /// Create a round when none is current
    async fn open_round(&self, height: u64) {
        let record = {
            let mut rounds = self.rounds.write().await;
            if rounds.current.is_some() {
                return;
            }
            self.rotate(&mut rounds, height)
        };
        self.persist_new_round(&record).await;
    }

    /// Supersede the current round (if any) with a fresh one targeting above `height`.
    ///
    /// Must be called under the rounds write lock.
    pub(crate) fn rotate(&self, rounds: &mut RoomRounds, height: u64) -> RoundRecord {
        if let Some(previous) = rounds.current.take() {
            rounds.history.insert(previous.target_height, previous);
        }
        self.evict_history(rounds);

        let target = self.setting.next_height(height.max(rounds.highest_target));
        let round = Round::open(
            self.variant(),
            self.tier,
            target,
            height,
            &self.setting,
            self.block_time,
        );
        rounds.highest_target = target;
        let record = round.record();
        rounds.current = Some(round);

        info!(variant = %record.variant, tier = %record.tier, round_id = %record.id, target, "round opened");
        record
    }

    /// Drop the oldest settled rounds above capacity; unsettled rounds stay
    fn evict_history(&self, rounds: &mut RoomRounds) {
        while rounds.history.len() > self.history_capacity {
            let oldest_settled = rounds
                .history
                .iter()
                .find(|(_, round)| round.settled)
                .map(|(height, _)| *height);
            match oldest_settled {
                Some(height) => {
                    rounds.history.remove(&height);
                }
                None => break,
            }
        }
    }

    pub(crate) async fn persist_new_round(&self, record: &RoundRecord) {
        if let Err(e) = self.store.insert_round(record).await {
            error!(round_id = %record.id, target = record.target_height, error = %e, "failed to persist new round");
        }
    }

    pub(crate) async fn persist_round_update(&self, record: &RoundRecord) {
        if let Err(e) = self.store.update_round(record).await {
            error!(round_id = %record.id, target = record.target_height, error = %e, "failed to persist round update");
        }
    }

    /// Accept a bet into the open round.
    ///
    /// The order is kept in memory right away; its durable write happens in the
    /// background and a failed write removes it again.
    pub async fn handle_bet(self: &Arc<Self>, bet: BetRequest) -> Result<Order, GameError> {
        match self.accept_bet(&bet).await {
            Ok(order) => {
                self.counters.bets_accepted.fetch_add(1, Ordering::Relaxed);
                debug!(order_id = %order.order_id, target = order.target_height, amount = order.bet_amount, "bet accepted");

                let room = Arc::clone(self);
                let pending = order.clone();
                let write = tokio::spawn(async move {
                    guarded("room-order-write", room.persist_order(pending)).await;
                });
                self.track(write).await;
                Ok(order)
            }
            Err(e) => {
                self.counters.bets_rejected.fetch_add(1, Ordering::Relaxed);
                debug!(uid = %bet.uid, amount = bet.amount, reason = %e, "bet rejected");
                Err(e)
            }
        }
    }

    async fn accept_bet(&self, bet: &BetRequest) -> Result<Order, GameError> {
        self.strategy.validate_bet(bet)?;
        self.limits.check(bet.amount)?;

        let rounds = self.rounds.read().await;
        let round = rounds.current.as_ref().ok_or(GameError::NoOpenRound)?;

        let now = current_timestamp_ms();
        if !round.is_open_for_bets(now) {
            let status = match round.status {
                RoundStatus::Betting => RoundStatus::Locked,
                other => other,
            };
            return Err(GameError::BettingClosed {
                round_id: round.id.clone(),
                status,
            });
        }

        let fee = self.setting.acceptance_fee(bet.amount);
        let order = Order {
            order_id: format!("{}-{}", bet.uid, self.next_order_stamp()),
            uid: bet.uid.clone(),
            round_id: round.id.clone(),
            variant: round.variant,
            tier: round.tier,
            target_height: round.target_height,
            prediction: bet.prediction,
            bet_amount: bet.amount,
            delivery_amount: bet.amount - fee,
            fee,
            reward_amount: 0.0,
            status: OrderStatus::Pending,
            created_at: now,
            end_time: round.end_time,
        };
        round.unconfirmed.insert(order.order_id.clone());
        round.bets.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn persist_order(&self, order: Order) {
        match self.store.create_order(&order).await {
            Ok(()) => self.confirm_order(&order).await,
            Err(e) => {
                error!(order_id = %order.order_id, error = %e, "order persistence failed; rolling back bet");
                self.rollback_order(&order).await;
            }
        }
    }

    async fn confirm_order(&self, order: &Order) {
        let rounds = self.rounds.read().await;
        if let Some(round) = rounds.find(order.target_height) {
            round.unconfirmed.remove(&order.order_id);
        }
    }

    /// Remove an order whose write failed. Settlement waits on `unconfirmed`,
    /// so the bet is gone before any batch could include it.
    async fn rollback_order(&self, order: &Order) {
        let rounds = self.rounds.read().await;
        match rounds.find(order.target_height) {
            Some(round) if !round.settled => {
                round.bets.remove(&order.order_id);
                round.unconfirmed.remove(&order.order_id);
            }
            Some(round) => {
                round.unconfirmed.remove(&order.order_id);
                warn!(order_id = %order.order_id, "round already settled; order kept");
            }
            None => warn!(order_id = %order.order_id, "round gone before rollback"),
        }
    }

    /// Keep a background task's handle so `join` can wait for it
    pub(crate) async fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Nanosecond stamp, strictly increasing within this room
    fn next_order_stamp(&self) -> u64 {
        let now = current_timestamp_nanos();
        let previous = self
            .order_clock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let rounds = self.rounds.read().await;
        RoomSnapshot {
            variant: self.variant(),
            tier: self.tier,
            latest_height: self.oracle.latest_height(),
            current: rounds.current.as_ref().map(Round::record),
            last_settled: rounds.last_settled.clone(),
        }
    }

    pub async fn current_round(&self) -> Option<RoundRecord> {
        self.rounds.read().await.current.as_ref().map(Round::record)
    }

    pub async fn last_settled_round(&self) -> Option<RoundRecord> {
        self.rounds.read().await.last_settled.clone()
    }

    pub async fn round(&self, target_height: u64) -> Result<RoundRecord, GameError> {
        self.rounds
            .read()
            .await
            .find(target_height)
            .map(Round::record)
            .ok_or(GameError::RoundNotFound(target_height))
    }

    /// Orders of the round targeting `target_height`, sorted by order id
    pub async fn round_orders(&self, target_height: u64) -> Result<Vec<Order>, GameError> {
        self.rounds
            .read()
            .await
            .find(target_height)
            .map(Round::orders)
            .ok_or(GameError::RoundNotFound(target_height))
    }

    /// Superseded rounds, newest first
    pub async fn history(&self, limit: usize) -> Vec<RoundRecord> {
        self.rounds
            .read()
            .await
            .history
            .values()
            .rev()
            .take(limit)
            .map(Round::record)
            .collect()
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            bets_accepted: self.counters.bets_accepted.load(Ordering::Relaxed),
            bets_rejected: self.counters.bets_rejected.load(Ordering::Relaxed),
            rounds_settled: self.counters.rounds_settled.load(Ordering::Relaxed),
            settlement_failures: self.counters.settlement_failures.load(Ordering::Relaxed),
        }
    }
}
