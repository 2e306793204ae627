//! Reconciliation Loop Integration Tests
//!
//! Drives the full engine through its public surface: scripted broker
//! fakes feed the loop, the admin handle and HTTP router observe it.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use roll_engine::server::ActiveStrikesResponse;
use roll_engine::{
    AppState, BrokerError, BrokerOrderId, EngineSettings, InstrumentResolver, MarketOrderRequest,
    OptionKind, OrderGateway, OrderResult, OrderSide, Position, PositionSource, Reconciler,
    RollExecutor, RollOutcome, SecurityId, StaticPriceSource, create_router,
};

// =============================================================================
// Fakes
// =============================================================================

/// Scripted position source. The final response repeats forever.
struct ScriptedPositions {
    responses: Mutex<std::collections::VecDeque<Result<Vec<Position>, BrokerError>>>,
}

impl ScriptedPositions {
    fn new(responses: Vec<Result<Vec<Position>, BrokerError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl PositionSource for ScriptedPositions {
    async fn fetch_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap_or(Ok(vec![]))
        } else {
            responses.front().cloned().unwrap_or(Ok(vec![]))
        }
    }
}

/// Records every order and fills it immediately.
struct RecordingGateway {
    calls: Mutex<Vec<MarketOrderRequest>>,
}

impl RecordingGateway {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<MarketOrderRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
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
            broker_order_id: BrokerOrderId::new(format!("ord-{n}")),
            avg_price: Some(dec!(95)),
        })
    }
}

/// Resolves every option to a deterministic security id.
struct TableResolver;

#[async_trait]
impl InstrumentResolver for TableResolver {
    async fn resolve_option(
        &self,
        _underlying: &str,
        _expiry: NaiveDate,
        strike: Decimal,
        kind: OptionKind,
    ) -> Result<SecurityId, BrokerError> {
        let side = match kind {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        };
        Ok(SecurityId::new(format!("{side}-{strike}")))
    }
}

// =============================================================================
// Builders
// =============================================================================

fn short_leg(kind: OptionKind, strike: Decimal) -> Position {
    let side = match kind {
        OptionKind::Call => "CE",
        OptionKind::Put => "PE",
    };
    Position {
        security_id: SecurityId::new(format!("old-{side}-{strike}")),
        trading_symbol: format!("NIFTY-Sep2026-{strike}-{side}"),
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

fn strangle(ce: Decimal, pe: Decimal) -> Vec<Position> {
    vec![
        short_leg(OptionKind::Call, ce),
        short_leg(OptionKind::Put, pe),
    ]
}

fn settings() -> EngineSettings {
    EngineSettings {
        interval: Duration::from_secs(10),
        strike_step: dec!(100),
        underlying: "NIFTY".to_string(),
        call_timeout: Duration::from_secs(5),
        history_limit: 100,
    }
}

fn build_engine(
    source: ScriptedPositions,
    price: Decimal,
) -> (
    Reconciler<ScriptedPositions, RecordingGateway, TableResolver, StaticPriceSource>,
    Arc<RecordingGateway>,
) {
    let gateway = Arc::new(RecordingGateway::new());
    let executor = RollExecutor::new(
        Arc::clone(&gateway),
        Arc::new(TableResolver),
        "NIFTY",
        Duration::from_secs(5),
    );
    let reconciler = Reconciler::new(
        settings(),
        Arc::new(source),
        executor,
        Arc::new(StaticPriceSource::new(price)),
    );
    (reconciler, gateway)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn breached_call_rolls_close_then_open_exactly_once() {
    // Price 25050 breaches the 25000 call. After the roll the scripted
    // book shows the new 25100 strike, so later ticks stay quiet.
    let source = ScriptedPositions::new(vec![
        Ok(strangle(dec!(25000), dec!(24500))),
        Ok(strangle(dec!(25100), dec!(24500))),
    ]);
    let (reconciler, gateway) = build_engine(source, dec!(25050));
    let handle = reconciler.handle();

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(reconciler.run(shutdown.clone()));

    // First tick fires immediately; let several more elapse.
    tokio::time::sleep(Duration::from_secs(35)).await;

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2, "one roll is exactly two orders");
    assert_eq!(calls[0].side, OrderSide::Buy);
    assert_eq!(calls[0].security_id, SecurityId::new("old-CE-25000"));
    assert_eq!(calls[0].quantity, dec!(50));
    assert_eq!(calls[1].side, OrderSide::Sell);
    assert_eq!(calls[1].security_id, SecurityId::new("CE-25100"));
    assert_eq!(calls[1].quantity, dec!(50));

    let history = handle.roll_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, RollOutcome::Completed);
    assert_eq!(history[0].execution.intent.old_strike, dec!(25000));
    assert_eq!(history[0].execution.intent.new_strike, dec!(25100));

    // The published strikes track the post-roll book.
    assert_eq!(handle.active_strikes().ce, Some(dec!(25100)));
    assert_eq!(handle.active_strikes().pe, Some(dec!(24500)));

    shutdown.cancel();
    engine.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn in_range_price_places_no_orders() {
    let source = ScriptedPositions::new(vec![Ok(strangle(dec!(25000), dec!(24500)))]);
    let (reconciler, gateway) = build_engine(source, dec!(24750));
    let handle = reconciler.handle();

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(reconciler.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(35)).await;

    assert!(gateway.calls().is_empty());
    assert!(handle.roll_history().is_empty());
    assert_eq!(handle.active_strikes().ce, Some(dec!(25000)));

    shutdown.cancel();
    engine.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_skips_the_cycle_and_the_loop_recovers() {
    // First fetch fails; the loop must stay alive, place nothing, and
    // roll normally on the next tick.
    let source = ScriptedPositions::new(vec![
        Err(BrokerError::Connection {
            message: "api down".to_string(),
        }),
        Ok(strangle(dec!(25000), dec!(24500))),
        Ok(strangle(dec!(25100), dec!(24500))),
    ]);
    let (reconciler, gateway) = build_engine(source, dec!(25050));
    let handle = reconciler.handle();

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(reconciler.run(shutdown.clone()));

    // Only the immediate first tick has fired: fetch failed, no orders.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(gateway.calls().is_empty());
    assert!(handle.view().last_error.is_some());

    // Next tick fetches cleanly and rolls the breached call.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.calls().len(), 2);
    assert_eq!(handle.roll_history().len(), 1);
    assert!(handle.view().last_error.is_none());

    shutdown.cancel();
    engine.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_trigger_runs_a_cycle_between_ticks() {
    let source = ScriptedPositions::new(vec![
        Ok(strangle(dec!(25000), dec!(24500))),
        Ok(strangle(dec!(25100), dec!(24500))),
    ]);
    let (reconciler, gateway) = build_engine(source, dec!(24750));
    let handle = reconciler.handle();

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(reconciler.run(shutdown.clone()));

    // First tick sees an in-range price; nothing happens.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(gateway.calls().is_empty());

    // A manual trigger forces the next cycle without waiting for the
    // ticker. The book still reads in-range, so still no orders, but
    // the snapshot advances to the second scripted response.
    handle.trigger_now();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.active_strikes().ce, Some(dec!(25100)));
    assert!(gateway.calls().is_empty());

    shutdown.cancel();
    engine.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn http_surface_reflects_engine_state() {
    let source = ScriptedPositions::new(vec![Ok(strangle(dec!(25000), dec!(24500)))]);
    let (reconciler, _gateway) = build_engine(source, dec!(24750));
    let handle = reconciler.handle();

    let shutdown = CancellationToken::new();
    let engine = tokio::spawn(reconciler.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let app = create_router(AppState {
        handle,
        version: "test".to_string(),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/active-strikes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let strikes: ActiveStrikesResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(strikes.ce, Some(dec!(25000)));
    assert_eq!(strikes.pe, Some(dec!(24500)));
    assert!(strikes.last_error.is_none());

    shutdown.cancel();
    engine.await.unwrap();
}
