//! Pure roll decision logic.
//!
//! Given the active strikes and the underlying's last price, decide
//! whether a leg has been breached and what the replacement strike is.
//! No I/O, no clock: everything the decision needs is passed in.

use rust_decimal::Decimal;

use crate::domain::{ActiveStrikes, Leg};

use super::intent::RollIntent;

/// Decision engine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecideError {
    /// Price is above the call strike and below the put strike at once.
    ///
    /// Possible only when the strikes are crossed (CE below PE), which
    /// means the book is not a sane short strangle. No order is safe.
    #[error("price {price} breaches both legs (CE {ce}, PE {pe}): strikes are crossed")]
    CrossedStrikes {
        /// Active call strike.
        ce: Decimal,
        /// Active put strike.
        pe: Decimal,
        /// Underlying price observed.
        price: Decimal,
    },

    /// Strike step must be a positive number of points.
    #[error("strike step must be positive, got {step}")]
    NonPositiveStep {
        /// The configured step.
        step: Decimal,
    },
}

/// Decide whether the strangle needs a roll at the given price.
///
/// Breach is strict: a price exactly at a strike is in range. A missing
/// leg never triggers; there is nothing to roll on that side. The call
/// rolls up by `step`, the put rolls down by `step`.
///
/// # Errors
///
/// Returns [`DecideError::NonPositiveStep`] for a zero or negative step
/// and [`DecideError::CrossedStrikes`] when both legs read as breached
/// simultaneously.
pub fn decide(
    strikes: &ActiveStrikes,
    price: Decimal,
    step: Decimal,
) -> Result<Option<RollIntent>, DecideError> {
    if step <= Decimal::ZERO {
        return Err(DecideError::NonPositiveStep { step });
    }

    let ce_breached = strikes.ce.filter(|ce| price > *ce);
    let pe_breached = strikes.pe.filter(|pe| price < *pe);

    match (ce_breached, pe_breached) {
        (Some(ce), Some(pe)) => Err(DecideError::CrossedStrikes { ce, pe, price }),
        (Some(ce), None) => Ok(Some(RollIntent::new(Leg::Ce, ce, ce + step, price))),
        (None, Some(pe)) => Ok(Some(RollIntent::new(Leg::Pe, pe, pe - step, price))),
        (None, None) => Ok(None),
    }
}
