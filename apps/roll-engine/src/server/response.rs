//! HTTP response bodies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Position;
use crate::engine::{LegState, RollRecord};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Application version.
    pub version: String,
}

/// Active strikes response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveStrikesResponse {
    /// Active short call strike, if any.
    pub ce: Option<Decimal>,
    /// Active short put strike, if any.
    pub pe: Option<Decimal>,
    /// Call-side execution state.
    pub ce_state: LegState,
    /// Put-side execution state.
    pub pe_state: LegState,
    /// When the engine last completed a cycle.
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Error from the last cycle, if it failed.
    pub last_error: Option<String>,
}

/// Positions snapshot response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionsResponse {
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
    /// All positions in the snapshot.
    pub positions: Vec<Position>,
}

/// Roll history response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RollHistoryResponse {
    /// Completed rolls, oldest first.
    pub rolls: Vec<RollRecord>,
}

/// Manual reconciliation trigger response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    /// Always true; the cycle runs asynchronously.
    pub triggered: bool,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}
