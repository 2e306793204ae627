//! Roll intents and execution tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerOrderId, Leg};

/// A proposed roll: close the short leg at `old_strike`, open a new one
/// at `new_strike`.
///
/// Created by the decision engine, consumed exactly once by the
/// executor, and terminated as completed, failed, or aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollIntent {
    /// The side being rolled.
    pub leg: Leg,
    /// Strike of the short leg to close.
    pub old_strike: Decimal,
    /// Strike of the new leg to open.
    pub new_strike: Decimal,
    /// Underlying price that triggered the roll.
    pub trigger_price: Decimal,
    /// When the intent was created.
    pub created_at: DateTime<Utc>,
}

impl RollIntent {
    /// Create an intent timestamped now.
    #[must_use]
    pub fn new(leg: Leg, old_strike: Decimal, new_strike: Decimal, trigger_price: Decimal) -> Self {
        Self {
            leg,
            old_strike,
            new_strike,
            trigger_price,
            created_at: Utc::now(),
        }
    }
}

/// State of one order leg within a roll execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderLegStatus {
    /// Not yet submitted.
    Pending,
    /// Submitted, awaiting a terminal state.
    Submitted,
    /// Fully filled.
    Filled {
        /// Broker-assigned order id.
        broker_order_id: BrokerOrderId,
        /// Average fill price, when reported.
        avg_price: Option<Decimal>,
    },
    /// Rejected by the broker (or never reached it).
    Rejected {
        /// Rejection reason.
        reason: String,
    },
    /// Terminal state unconfirmed (timeout). Never assumed filled.
    Unknown,
}

impl OrderLegStatus {
    /// Whether the leg is still awaiting submission.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the leg confirmed a full fill.
    #[must_use]
    pub const fn is_filled(&self) -> bool {
        matches!(self, Self::Filled { .. })
    }

    /// Whether the leg reached a terminal non-fill state.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Unknown)
    }
}

/// Progress of one roll: the close-leg and open-leg order results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollExecution {
    /// The intent being executed.
    pub intent: RollIntent,
    /// Buy-to-cover order on the old strike.
    pub close: OrderLegStatus,
    /// Sell-to-establish order on the new strike.
    pub open: OrderLegStatus,
}

impl RollExecution {
    /// Create a fresh execution with both legs pending.
    #[must_use]
    pub const fn new(intent: RollIntent) -> Self {
        Self {
            intent,
            close: OrderLegStatus::Pending,
            open: OrderLegStatus::Pending,
        }
    }

    /// Terminal outcome, or `None` while the execution is in progress.
    ///
    /// A failed close leg is terminal on its own: the open leg is never
    /// submitted, so it stays `Pending` by construction.
    #[must_use]
    pub fn outcome(&self) -> Option<RollOutcome> {
        if self.close.is_failed() {
            return Some(RollOutcome::FailedAtClose);
        }
        if self.close.is_filled() {
            if self.open.is_filled() {
                return Some(RollOutcome::Completed);
            }
            if self.open.is_failed() {
                return Some(RollOutcome::FailedAtOpen);
            }
        }
        None
    }

    /// Whether the execution has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }
}

/// Terminal outcome of a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollOutcome {
    /// Both legs filled; the roll is done.
    Completed,
    /// Close leg failed; the position is unchanged.
    FailedAtClose,
    /// Close filled but open failed; the side is now flat and needs
    /// operator attention.
    FailedAtOpen,
    /// Superseded by newer data before any order was placed.
    Aborted,
}

/// One finished roll, kept in the engine's bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRecord {
    /// The execution as it ended.
    pub execution: RollExecution,
    /// Terminal outcome.
    pub outcome: RollOutcome,
    /// Operator-facing detail (abort reason, failure context).
    pub detail: Option<String>,
    /// When the roll finished.
    pub finished_at: DateTime<Utc>,
}

impl RollRecord {
    /// Record a terminal execution.
    #[must_use]
    pub fn from_execution(execution: RollExecution) -> Self {
        let outcome = execution.outcome().unwrap_or(RollOutcome::Aborted);
        Self {
            execution,
            outcome,
            detail: None,
            finished_at: Utc::now(),
        }
    }

    /// Record an intent aborted before any order was placed.
    #[must_use]
    pub fn aborted(intent: RollIntent, reason: impl Into<String>) -> Self {
        Self {
            execution: RollExecution::new(intent),
            outcome: RollOutcome::Aborted,
            detail: Some(reason.into()),
            finished_at: Utc::now(),
        }
    }
}

/// Tagged per-leg execution state owned by the reconciliation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegState {
    /// No roll in flight on this leg.
    #[default]
    Idle,
    /// A roll is executing on this leg.
    Executing {
        /// When the execution started.
        since: DateTime<Utc>,
    },
}

impl LegState {
    /// Whether the leg is free to accept a new intent.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent() -> RollIntent {
        RollIntent::new(Leg::Ce, dec!(25000), dec!(25100), dec!(25050))
    }

    fn filled() -> OrderLegStatus {
        OrderLegStatus::Filled {
            broker_order_id: BrokerOrderId::new("ord-1"),
            avg_price: Some(dec!(118.2)),
        }
    }

    #[test]
    fn fresh_execution_is_not_terminal() {
        let execution = RollExecution::new(intent());
        assert!(execution.close.is_pending());
        assert!(execution.open.is_pending());
        assert_eq!(execution.outcome(), None);
    }

    #[test]
    fn close_rejection_is_terminal_without_open() {
        let mut execution = RollExecution::new(intent());
        execution.close = OrderLegStatus::Rejected {
            reason: "insufficient margin".to_string(),
        };
        assert_eq!(execution.outcome(), Some(RollOutcome::FailedAtClose));
        assert!(execution.open.is_pending());
    }

    #[test]
    fn close_timeout_is_failed_not_filled() {
        let mut execution = RollExecution::new(intent());
        execution.close = OrderLegStatus::Unknown;
        assert_eq!(execution.outcome(), Some(RollOutcome::FailedAtClose));
    }

    #[test]
    fn both_filled_is_completed() {
        let mut execution = RollExecution::new(intent());
        execution.close = filled();
        execution.open = filled();
        assert_eq!(execution.outcome(), Some(RollOutcome::Completed));
    }

    #[test]
    fn open_rejection_after_close_fill_is_failed_at_open() {
        let mut execution = RollExecution::new(intent());
        execution.close = filled();
        execution.open = OrderLegStatus::Rejected {
            reason: "freeze qty exceeded".to_string(),
        };
        assert_eq!(execution.outcome(), Some(RollOutcome::FailedAtOpen));
    }

    #[test]
    fn close_filled_open_pending_is_in_progress() {
        let mut execution = RollExecution::new(intent());
        execution.close = filled();
        assert_eq!(execution.outcome(), None);
        assert!(!execution.is_terminal());
    }

    #[test]
    fn aborted_record_keeps_intent_and_reason() {
        let record = RollRecord::aborted(intent(), "leg not found at 25000");
        assert_eq!(record.outcome, RollOutcome::Aborted);
        assert_eq!(record.detail.as_deref(), Some("leg not found at 25000"));
        assert!(record.execution.close.is_pending());
    }

    #[test]
    fn leg_state_default_is_idle() {
        assert!(LegState::default().is_idle());
        let executing = LegState::Executing { since: Utc::now() };
        assert!(!executing.is_idle());
    }
}
