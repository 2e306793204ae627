//! The roll engine: decision, execution, and the reconciliation loop.
//!
//! - `decide` is a pure function over `(ActiveStrikes, price, step)`
//! - `RollExecutor` turns a `RollIntent` into close-then-open orders
//! - `Reconciler` is the timed loop that owns all mutable state

mod decision;
mod executor;
mod intent;
mod reconciler;
mod snapshot_store;

pub use decision::{DecideError, decide};
pub use executor::{ExecuteError, RollExecutor};
pub use intent::{LegState, OrderLegStatus, RollExecution, RollIntent, RollOutcome, RollRecord};
pub use reconciler::{CycleError, EngineHandle, EngineSettings, EngineView, Reconciler};
pub use snapshot_store::SnapshotStore;
