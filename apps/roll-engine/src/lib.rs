// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Roll Engine - Strike-Roll Reconciliation Core
//!
//! A periodic reconciliation controller for short-strangle option
//! positions. Each cycle the engine pulls a fresh position snapshot from
//! the broker, derives the active short CE/PE strikes, compares them
//! against the live underlying price, and - when a strike has been
//! breached - rolls that leg exactly once: buy-to-cover the old short
//! leg, then sell-to-establish the new leg one step further out.
//!
//! # Architecture
//!
//! - `domain`: position snapshots, active-strike extraction (pure)
//! - `engine`: roll decision, executor, and the reconciliation loop
//! - `ports`: trait seams for the broker and the underlying price feed
//! - `broker`: Dhan REST adapter implementing the ports
//! - `server`: read-only HTTP query surface plus a manual trigger
//!
//! The reconciliation loop is the single writer of all mutable state;
//! decision and extraction are pure functions over data handed to them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Configuration loading and validation.
pub mod config;

/// Position snapshots and strike extraction.
pub mod domain;

/// Roll decision, execution, and the reconciliation loop.
pub mod engine;

/// Trait seams for external collaborators.
pub mod ports;

/// Broker adapters.
pub mod broker;

/// HTTP admin/query surface.
pub mod server;

// Domain re-exports
pub use domain::{
    ActiveStrikes, ExtractError, Leg, OptionKind, Position, PositionSnapshot, SecurityId,
    extract_active_strikes,
};

// Engine re-exports
pub use engine::{
    CycleError, DecideError, EngineHandle, EngineSettings, EngineView, ExecuteError, LegState,
    OrderLegStatus, Reconciler, RollExecution, RollExecutor, RollIntent, RollOutcome, RollRecord,
    SnapshotStore, decide,
};

// Port re-exports
pub use ports::{
    BrokerError, BrokerOrderId, InstrumentResolver, MarketOrderRequest, OrderGateway,
    OrderResult, OrderSide, PositionSource, PriceFeedError, StaticPriceSource,
    UnderlyingPriceSource,
};

// Infrastructure re-exports
pub use broker::dhan::{DhanBrokerAdapter, DhanConfig, DhanScripMaster};
pub use server::{AppState, create_router};
