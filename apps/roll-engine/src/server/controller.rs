//! Axum router and handlers for the admin surface.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::engine::EngineHandle;

use super::response::{
    ActiveStrikesResponse, ErrorResponse, HealthResponse, PositionsResponse, ReconcileResponse,
    RollHistoryResponse,
};

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle for observing and prodding the engine.
    pub handle: EngineHandle,
    /// Application version.
    pub version: String,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/positions", get(get_positions))
        .route("/v1/active-strikes", get(get_active_strikes))
        .route("/v1/roll-history", get(get_roll_history))
        .route("/v1/reconcile", post(trigger_reconcile))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
    })
}

/// Latest position snapshot.
async fn get_positions(State(state): State<AppState>) -> Response {
    state.handle.latest_snapshot().map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "no position snapshot captured yet".to_string(),
                }),
            )
                .into_response()
        },
        |snapshot| {
            Json(PositionsResponse {
                captured_at: snapshot.captured_at(),
                positions: snapshot.positions().to_vec(),
            })
            .into_response()
        },
    )
}

/// Active strikes and per-leg execution state.
async fn get_active_strikes(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.handle.view();
    Json(ActiveStrikesResponse {
        ce: view.strikes.ce,
        pe: view.strikes.pe,
        ce_state: view.ce_state,
        pe_state: view.pe_state,
        last_cycle_at: view.last_cycle_at,
        last_error: view.last_error,
    })
}

/// Bounded roll history, oldest first.
async fn get_roll_history(State(state): State<AppState>) -> impl IntoResponse {
    Json(RollHistoryResponse {
        rolls: state.handle.roll_history(),
    })
}

/// Request an immediate reconciliation cycle.
async fn trigger_reconcile(State(state): State<AppState>) -> impl IntoResponse {
    state.handle.trigger_now();
    (StatusCode::ACCEPTED, Json(ReconcileResponse { triggered: true }))
}
