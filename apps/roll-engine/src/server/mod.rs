//! HTTP admin/query surface.
//!
//! Read-only views over the engine's published state plus a manual
//! reconciliation trigger. Handlers never touch engine internals; they
//! observe through an [`crate::engine::EngineHandle`].

mod controller;
mod response;

pub use controller::{AppState, create_router};
pub use response::{
    ActiveStrikesResponse, ErrorResponse, HealthResponse, PositionsResponse, ReconcileResponse,
    RollHistoryResponse,
};
