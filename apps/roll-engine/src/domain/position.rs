//! Broker positions and immutable snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::identifiers::SecurityId;

/// Option contract kind for a derivative leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionKind {
    /// Call option (CE leg).
    Call,
    /// Put option (PE leg).
    Put,
}

/// One open derivative leg as reported by the broker.
///
/// Immutable once received; a new snapshot replaces, never mutates,
/// prior positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Broker security identifier for the contract.
    pub security_id: SecurityId,
    /// Exchange trading symbol (e.g. `NIFTY-Aug2026-25000-CE`).
    pub trading_symbol: String,
    /// Underlying symbol (e.g. `NIFTY`).
    pub underlying: String,
    /// Option kind; `None` for non-option legs (futures, equity).
    pub option_kind: Option<OptionKind>,
    /// Strike price; `None` for non-option legs.
    pub strike: Option<Decimal>,
    /// Contract expiry date; `None` for non-derivative legs.
    pub expiry: Option<NaiveDate>,
    /// Signed net quantity: negative = short, positive = long.
    pub net_qty: Decimal,
    /// Average buy price.
    pub buy_avg: Decimal,
    /// Average sell price.
    pub sell_avg: Decimal,
    /// Realized profit on the position.
    pub realized_pnl: Decimal,
    /// Unrealized (mark-to-market) profit on the position.
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Whether the leg has any open quantity.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.net_qty.is_zero()
    }

    /// Whether the leg is net short.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.net_qty.is_sign_negative() && !self.net_qty.is_zero()
    }
}

/// An immutable, fully-formed set of positions captured at one instant.
///
/// At most one snapshot is "current" at any time; readers always see a
/// complete snapshot, never a partially-updated one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    positions: Vec<Position>,
    captured_at: DateTime<Utc>,
}

impl PositionSnapshot {
    /// Create a snapshot captured now.
    #[must_use]
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            positions,
            captured_at: Utc::now(),
        }
    }

    /// Create a snapshot with an explicit capture time.
    #[must_use]
    pub const fn with_captured_at(positions: Vec<Position>, captured_at: DateTime<Utc>) -> Self {
        Self {
            positions,
            captured_at,
        }
    }

    /// All positions in the snapshot.
    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// When the snapshot was captured.
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Find the open short leg of the given kind at the given strike.
    ///
    /// Long legs at the same strike (calendar structures) are ignored.
    #[must_use]
    pub fn find_short_leg(&self, kind: OptionKind, strike: Decimal) -> Option<&Position> {
        self.positions.iter().find(|p| {
            p.option_kind == Some(kind) && p.strike == Some(strike) && p.is_short()
        })
    }
}
