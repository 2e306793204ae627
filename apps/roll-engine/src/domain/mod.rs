//! Domain model: broker positions, snapshots, and active-strike extraction.
//!
//! Everything in this module is immutable data plus pure functions. The
//! reconciliation loop owns the only mutable references; nothing here
//! performs IO.

mod identifiers;
mod position;
mod strikes;

pub use identifiers::{BrokerOrderId, SecurityId};
pub use position::{OptionKind, Position, PositionSnapshot};
pub use strikes::{ActiveStrikes, ExtractError, Leg, extract_active_strikes};
