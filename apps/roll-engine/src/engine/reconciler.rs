//! Timed reconciliation loop.
//!
//! The reconciler is the only writer of engine state. Each cycle it
//! refreshes the position snapshot, extracts the active strikes, asks
//! the decision engine whether a leg is breached, and executes at most
//! one roll. The admin surface observes state through a watch channel
//! and requests work through a notify handle, so no lock is shared with
//! the loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{ActiveStrikes, ExtractError, Leg, PositionSnapshot, extract_active_strikes};
use crate::ports::{
    BrokerError, InstrumentResolver, OrderGateway, PositionSource, PriceFeedError,
    UnderlyingPriceSource,
};

use super::decision::{DecideError, decide};
use super::executor::RollExecutor;
use super::intent::{LegState, RollRecord};
use super::snapshot_store::SnapshotStore;

/// Tunables for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Time between reconciliation cycles.
    pub interval: Duration,
    /// Points to move a strike per roll.
    pub strike_step: Decimal,
    /// Underlying symbol the strangle is written on.
    pub underlying: String,
    /// Deadline for each broker or price-feed call.
    pub call_timeout: Duration,
    /// Maximum roll records retained in history.
    pub history_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            strike_step: Decimal::ONE_HUNDRED,
            underlying: "NIFTY".to_string(),
            call_timeout: Duration::from_secs(10),
            history_limit: 100,
        }
    }
}

/// Read-only view of engine state, published after every cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineView {
    /// Active strikes from the last successful extraction.
    pub strikes: ActiveStrikes,
    /// Most recent position snapshot, if any fetch has succeeded.
    pub snapshot: Option<PositionSnapshot>,
    /// Call-side execution state.
    pub ce_state: LegState,
    /// Put-side execution state.
    pub pe_state: LegState,
    /// Completed rolls, oldest first, bounded by the history limit.
    pub history: Vec<RollRecord>,
    /// When the last cycle finished.
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Error from the last cycle, if it failed.
    pub last_error: Option<String>,
}

/// Why a reconciliation cycle took no action.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Position fetch failed; the cycle is skipped, never acted on
    /// partial data.
    #[error("position fetch failed: {0}")]
    Fetch(#[from] BrokerError),

    /// Underlying price unavailable.
    #[error("underlying price unavailable: {0}")]
    Price(#[from] PriceFeedError),

    /// Active strikes could not be derived unambiguously.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The decision engine refused to decide.
    #[error(transparent)]
    Decide(#[from] DecideError),

    /// A roll is already executing on the breached leg.
    #[error("roll already in progress on {leg} leg")]
    RollInProgress {
        /// The busy leg.
        leg: Leg,
    },
}

/// Cloneable handle for observing the engine and requesting work.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    view: watch::Receiver<EngineView>,
    trigger: Arc<Notify>,
}

impl EngineHandle {
    /// Snapshot of the full engine view.
    #[must_use]
    pub fn view(&self) -> EngineView {
        self.view.borrow().clone()
    }

    /// Currently active strikes.
    #[must_use]
    pub fn active_strikes(&self) -> ActiveStrikes {
        self.view.borrow().strikes
    }

    /// Roll history, oldest first.
    #[must_use]
    pub fn roll_history(&self) -> Vec<RollRecord> {
        self.view.borrow().history.clone()
    }

    /// The latest position snapshot, if one exists.
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<PositionSnapshot> {
        self.view.borrow().snapshot.clone()
    }

    /// Request an immediate reconciliation cycle.
    ///
    /// Coalesces: triggering while a cycle is pending schedules at most
    /// one extra cycle.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }
}

/// The reconciliation loop. Owns all mutable engine state.
#[derive(Debug)]
pub struct Reconciler<P, G, R, F> {
    settings: EngineSettings,
    store: SnapshotStore<P>,
    executor: RollExecutor<G, R>,
    prices: Arc<F>,
    ce_state: LegState,
    pe_state: LegState,
    strikes: ActiveStrikes,
    history: VecDeque<RollRecord>,
    view_tx: watch::Sender<EngineView>,
    trigger: Arc<Notify>,
}

impl<P, G, R, F> Reconciler<P, G, R, F>
where
    P: PositionSource,
    G: OrderGateway,
    R: InstrumentResolver,
    F: UnderlyingPriceSource,
{
    /// Assemble a reconciler from its collaborators.
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        positions: Arc<P>,
        executor: RollExecutor<G, R>,
        prices: Arc<F>,
    ) -> Self {
        let store = SnapshotStore::new(positions, settings.call_timeout);
        let (view_tx, _) = watch::channel(EngineView::default());
        Self {
            settings,
            store,
            executor,
            prices,
            ce_state: LegState::Idle,
            pe_state: LegState::Idle,
            strikes: ActiveStrikes::default(),
            history: VecDeque::new(),
            view_tx,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Handle for the admin surface.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            view: self.view_tx.subscribe(),
            trigger: Arc::clone(&self.trigger),
        }
    }

    /// Run until the token is cancelled.
    ///
    /// Cancellation is observed between cycles only: an executing roll
    /// always runs to a terminal state before the loop exits.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            underlying = %self.settings.underlying,
            interval_secs = self.settings.interval.as_secs(),
            "reconciliation loop started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("reconciliation loop stopping");
                    break;
                }
                _ = ticker.tick() => {}
                () = self.trigger.notified() => {
                    debug!("manual reconciliation requested");
                }
            }

            let last_error = match self.run_cycle().await {
                Ok(Some(record)) => {
                    info!(outcome = ?record.outcome, "roll recorded");
                    None
                }
                Ok(None) => None,
                Err(err) => {
                    error!(error = %err, "reconciliation cycle failed");
                    Some(err.to_string())
                }
            };
            self.publish(last_error);
        }
    }

    async fn run_cycle(&mut self) -> Result<Option<RollRecord>, CycleError> {
        let snapshot = self.store.refresh().await?.clone();
        let strikes = extract_active_strikes(&snapshot)?;
        self.strikes = strikes;

        let price = self.fetch_price().await?;
        let Some(intent) = decide(&strikes, price, self.settings.strike_step)? else {
            debug!(%price, ce = ?strikes.ce, pe = ?strikes.pe, "strikes in range");
            return Ok(None);
        };

        let leg = intent.leg;
        if !self.leg_state(leg).is_idle() {
            return Err(CycleError::RollInProgress { leg });
        }

        self.set_leg_state(leg, LegState::Executing { since: Utc::now() });
        let result = self.executor.execute(intent.clone(), &snapshot).await;
        self.set_leg_state(leg, LegState::Idle);

        let record = match result {
            Ok(execution) => RollRecord::from_execution(execution),
            Err(err) => {
                warn!(error = %err, "roll intent aborted before any order");
                RollRecord::aborted(intent, err.to_string())
            }
        };
        self.push_record(record.clone());
        Ok(Some(record))
    }

    async fn fetch_price(&self) -> Result<Decimal, CycleError> {
        match timeout(
            self.settings.call_timeout,
            self.prices.last_price(&self.settings.underlying),
        )
        .await
        {
            Ok(Ok(price)) => Ok(price),
            Ok(Err(err)) => Err(CycleError::Price(err)),
            Err(_) => Err(CycleError::Price(PriceFeedError::Timeout)),
        }
    }

    const fn leg_state(&self, leg: Leg) -> LegState {
        match leg {
            Leg::Ce => self.ce_state,
            Leg::Pe => self.pe_state,
        }
    }

    fn set_leg_state(&mut self, leg: Leg, state: LegState) {
        match leg {
            Leg::Ce => self.ce_state = state,
            Leg::Pe => self.pe_state = state,
        }
    }

    fn push_record(&mut self, record: RollRecord) {
        self.history.push_back(record);
        while self.history.len() > self.settings.history_limit {
            self.history.pop_front();
        }
    }

    fn publish(&self, last_error: Option<String>) {
        self.view_tx.send_replace(EngineView {
            strikes: self.strikes,
            snapshot: self.store.current().cloned(),
            ce_state: self.ce_state,
            pe_state: self.pe_state,
            history: self.history.iter().cloned().collect(),
            last_cycle_at: Some(Utc::now()),
            last_error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OptionKind, Position, SecurityId};
    use crate::engine::intent::{RollIntent, RollOutcome};
    use crate::ports::{MarketOrderRequest, OrderResult, OrderSide, StaticPriceSource};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FakeSource {
        responses: Mutex<std::collections::VecDeque<Result<Vec<Position>, BrokerError>>>,
    }

    impl FakeSource {
        fn scripted(responses: Vec<Result<Vec<Position>, BrokerError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn always(positions: Vec<Position>) -> Self {
            Self::scripted(vec![Ok(positions)])
        }

        fn failing(err: BrokerError) -> Self {
            Self::scripted(vec![Err(err)])
        }
    }

    #[async_trait]
    impl PositionSource for FakeSource {
        async fn fetch_positions(&self) -> Result<Vec<Position>, BrokerError> {
            // The final scripted response repeats forever.
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap_or(Ok(vec![]))
            } else {
                responses.front().cloned().unwrap_or(Ok(vec![]))
            }
        }
    }

    struct FakeGateway {
        calls: Mutex<Vec<MarketOrderRequest>>,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderGateway for FakeGateway {
        async fn place_market_order(
            &self,
            request: MarketOrderRequest,
        ) -> Result<OrderResult, BrokerError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request);
                calls.len()
            };
            Ok(OrderResult::Filled {
                broker_order_id: crate::domain::BrokerOrderId::new(format!("ord-{n}")),
                avg_price: Some(dec!(100)),
            })
        }
    }

    struct FakeResolver;

    #[async_trait]
    impl InstrumentResolver for FakeResolver {
        async fn resolve_option(
            &self,
            _underlying: &str,
            _expiry: NaiveDate,
            strike: Decimal,
            kind: OptionKind,
        ) -> Result<SecurityId, BrokerError> {
            Ok(SecurityId::new(format!("{kind:?}-{strike}")))
        }
    }

    fn short_leg(kind: OptionKind, strike: Decimal) -> Position {
        Position {
            security_id: SecurityId::new(format!("old-{kind:?}-{strike}")),
            trading_symbol: format!("NIFTY-{strike}"),
            underlying: "NIFTY".to_string(),
            option_kind: Some(kind),
            strike: Some(strike),
            expiry: NaiveDate::from_ymd_opt(2026, 9, 24),
            net_qty: dec!(-50),
            buy_avg: Decimal::ZERO,
            sell_avg: dec!(120),
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    fn reconciler(
        source: FakeSource,
        price: Decimal,
    ) -> (
        Reconciler<FakeSource, FakeGateway, FakeResolver, StaticPriceSource>,
        Arc<FakeGateway>,
    ) {
        let gateway = Arc::new(FakeGateway::new());
        let executor = RollExecutor::new(
            Arc::clone(&gateway),
            Arc::new(FakeResolver),
            "NIFTY",
            Duration::from_secs(5),
        );
        let reconciler = Reconciler::new(
            EngineSettings::default(),
            Arc::new(source),
            executor,
            Arc::new(StaticPriceSource::new(price)),
        );
        (reconciler, gateway)
    }

    #[tokio::test]
    async fn breached_call_is_rolled_in_one_cycle() {
        let source = FakeSource::always(vec![
            short_leg(OptionKind::Call, dec!(25000)),
            short_leg(OptionKind::Put, dec!(24500)),
        ]);
        let (mut reconciler, gateway) = reconciler(source, dec!(25050));

        let record = reconciler.run_cycle().await.unwrap().unwrap();
        assert_eq!(record.outcome, RollOutcome::Completed);
        assert_eq!(record.execution.intent.new_strike, dec!(25100));

        let calls = gateway.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].side, OrderSide::Buy);
        assert_eq!(calls[1].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn in_range_price_takes_no_action() {
        let source = FakeSource::always(vec![
            short_leg(OptionKind::Call, dec!(25000)),
            short_leg(OptionKind::Put, dec!(24500)),
        ]);
        let (mut reconciler, gateway) = reconciler(source, dec!(24750));

        assert!(reconciler.run_cycle().await.unwrap().is_none());
        assert!(gateway.calls.lock().unwrap().is_empty());
        assert_eq!(reconciler.strikes.ce, Some(dec!(25000)));
        assert_eq!(reconciler.strikes.pe, Some(dec!(24500)));
    }

    #[tokio::test]
    async fn fetch_failure_skips_cycle_without_orders() {
        let source = FakeSource::failing(BrokerError::Connection {
            message: "api down".to_string(),
        });
        let (mut reconciler, gateway) = reconciler(source, dec!(25050));

        let err = reconciler.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch(_)));
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_side_blocks_the_cycle() {
        let source = FakeSource::always(vec![
            short_leg(OptionKind::Call, dec!(25000)),
            short_leg(OptionKind::Call, dec!(25100)),
        ]);
        let (mut reconciler, gateway) = reconciler(source, dec!(25050));

        let err = reconciler.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Extract(_)));
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn busy_leg_rejects_a_second_intent() {
        let source = FakeSource::always(vec![short_leg(OptionKind::Call, dec!(25000))]);
        let (mut reconciler, gateway) = reconciler(source, dec!(25050));
        reconciler.ce_state = LegState::Executing { since: Utc::now() };

        let err = reconciler.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::RollInProgress { leg: Leg::Ce }));
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let source = FakeSource::always(vec![]);
        let (mut reconciler, _gateway) = reconciler(source, dec!(25050));
        reconciler.settings.history_limit = 2;

        for i in 0..4 {
            let intent =
                RollIntent::new(Leg::Ce, dec!(25000) + Decimal::from(i), dec!(25100), dec!(25050));
            reconciler.push_record(RollRecord::aborted(intent, "test"));
        }

        assert_eq!(reconciler.history.len(), 2);
        assert_eq!(
            reconciler.history[0].execution.intent.old_strike,
            dec!(25002)
        );
    }

    #[tokio::test]
    async fn handle_observes_published_state_and_triggers_cycles() {
        let source = FakeSource::always(vec![
            short_leg(OptionKind::Call, dec!(25000)),
            short_leg(OptionKind::Put, dec!(24500)),
        ]);
        let (mut reconciler, _gateway) = reconciler(source, dec!(24750));
        let handle = reconciler.handle();

        reconciler.run_cycle().await.unwrap();
        reconciler.publish(None);

        let view = handle.view();
        assert_eq!(view.strikes.ce, Some(dec!(25000)));
        assert!(view.snapshot.is_some());
        assert!(view.last_error.is_none());
        assert_eq!(handle.active_strikes().pe, Some(dec!(24500)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_cycles_and_shuts_down_cleanly() {
        // First fetch shows a breached call; the book reads flat after
        // the roll, so later ticks take no action.
        let source = FakeSource::scripted(vec![
            Ok(vec![
                short_leg(OptionKind::Call, dec!(25000)),
                short_leg(OptionKind::Put, dec!(24500)),
            ]),
            Ok(vec![]),
        ]);
        let (mut reconciler, gateway) = reconciler(source, dec!(25050));
        reconciler.settings.interval = Duration::from_secs(3600);
        let handle = reconciler.handle();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(reconciler.run(shutdown.clone()));

        // First tick fires immediately and rolls the breached call.
        loop {
            tokio::task::yield_now().await;
            if !handle.roll_history().is_empty() {
                break;
            }
        }
        assert_eq!(gateway.calls.lock().unwrap().len(), 2);

        shutdown.cancel();
        task.await.unwrap();
    }
}
