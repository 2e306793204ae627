//! Active-strike extraction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{OptionKind, PositionSnapshot};

/// One side of a two-sided short position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Leg {
    /// Short call side.
    Ce,
    /// Short put side.
    Pe,
}

impl Leg {
    /// The option kind traded on this side.
    #[must_use]
    pub const fn option_kind(self) -> OptionKind {
        match self {
            Self::Ce => OptionKind::Call,
            Self::Pe => OptionKind::Put,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ce => write!(f, "CE"),
            Self::Pe => write!(f, "PE"),
        }
    }
}

/// The currently active short strikes, derived from a snapshot.
///
/// A side with no open leg is `None` - never a numeric placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStrikes {
    /// Active short call strike, if any.
    pub ce: Option<Decimal>,
    /// Active short put strike, if any.
    pub pe: Option<Decimal>,
}

/// Extraction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// More than one distinct open strike on one side: there is no
    /// unambiguous roll target, so no action may be taken.
    #[error("multiple active {leg} strikes: ambiguous roll target ({strikes:?})")]
    AmbiguousSide {
        /// The side with multiple strikes.
        leg: Leg,
        /// The distinct open strikes found.
        strikes: Vec<Decimal>,
    },
}

/// Derive the active CE/PE strikes from a snapshot.
///
/// Pure and deterministic. Scans every position once; a position
/// contributes a strike when it is an option leg with non-zero net
/// quantity. Multiple legs at the *same* strike (calendar structures)
/// collapse to one candidate; multiple *distinct* strikes on a side are
/// an error rather than last-writer-wins.
pub fn extract_active_strikes(snapshot: &PositionSnapshot) -> Result<ActiveStrikes, ExtractError> {
    let ce = side_strike(snapshot, Leg::Ce)?;
    let pe = side_strike(snapshot, Leg::Pe)?;
    Ok(ActiveStrikes { ce, pe })
}

fn side_strike(snapshot: &PositionSnapshot, leg: Leg) -> Result<Option<Decimal>, ExtractError> {
    let kind = leg.option_kind();
    let mut strikes: Vec<Decimal> = snapshot
        .positions()
        .iter()
        .filter(|p| p.is_open() && p.option_kind == Some(kind))
        .filter_map(|p| p.strike)
        .collect();
    strikes.sort();
    strikes.dedup();

    match strikes.len() {
        0 => Ok(None),
        1 => Ok(Some(strikes[0])),
        _ => Err(ExtractError::AmbiguousSide { leg, strikes }),
    }
}
