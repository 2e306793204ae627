//! Roll execution: close the breached leg, then open the replacement.
//!
//! Ordering is load-bearing. The close order must confirm a fill before
//! the open order is submitted; a close that rejects or times out ends
//! the execution with the open leg untouched. Doubling the short side by
//! opening first is never acceptable.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::domain::{Leg, PositionSnapshot};
use crate::ports::{
    BrokerError, InstrumentResolver, MarketOrderRequest, OrderGateway, OrderResult, OrderSide,
};

use super::intent::{OrderLegStatus, RollExecution, RollIntent};

/// Executes roll intents against the broker ports.
#[derive(Debug)]
pub struct RollExecutor<G, R> {
    gateway: Arc<G>,
    resolver: Arc<R>,
    underlying: String,
    call_timeout: Duration,
}

/// Pre-flight failures that abort an intent before any order is placed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    /// The short leg the intent targets is no longer in the snapshot.
    /// The decision was made on stale data; nothing is safe to do.
    #[error("no open short {leg} leg at strike {strike}")]
    LegNotFound {
        /// Side the intent targets.
        leg: Leg,
        /// Strike the intent targets.
        strike: Decimal,
    },

    /// The leg to roll carries no expiry date, so the replacement
    /// contract cannot be resolved.
    #[error("short {leg} leg at strike {strike} has no expiry date")]
    MissingExpiry {
        /// Side the intent targets.
        leg: Leg,
        /// Strike the intent targets.
        strike: Decimal,
    },
}

impl<G, R> RollExecutor<G, R>
where
    G: OrderGateway,
    R: InstrumentResolver,
{
    /// Create an executor over the given broker ports.
    pub fn new(
        gateway: Arc<G>,
        resolver: Arc<R>,
        underlying: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            resolver,
            underlying: underlying.into(),
            call_timeout,
        }
    }

    /// Execute a roll intent against the snapshot it was decided on.
    ///
    /// Returns the execution in a terminal state. Broker-level failures
    /// are captured in the per-leg statuses rather than bubbled up; only
    /// pre-flight validation failures are errors, and those mean the
    /// intent was abandoned with no order placed.
    ///
    /// # Errors
    ///
    /// [`ExecuteError::LegNotFound`] when the targeted short leg is
    /// absent from the snapshot, [`ExecuteError::MissingExpiry`] when it
    /// has no expiry to resolve the replacement contract against.
    pub async fn execute(
        &self,
        intent: RollIntent,
        snapshot: &PositionSnapshot,
    ) -> Result<RollExecution, ExecuteError> {
        let kind = intent.leg.option_kind();
        let position = snapshot
            .find_short_leg(kind, intent.old_strike)
            .ok_or(ExecuteError::LegNotFound {
                leg: intent.leg,
                strike: intent.old_strike,
            })?;
        let expiry = position.expiry.ok_or(ExecuteError::MissingExpiry {
            leg: intent.leg,
            strike: intent.old_strike,
        })?;
        let quantity = position.net_qty.abs();
        let close_security = position.security_id.clone();

        info!(
            leg = %intent.leg,
            old_strike = %intent.old_strike,
            new_strike = %intent.new_strike,
            %quantity,
            "executing roll"
        );

        let mut execution = RollExecution::new(intent);

        let close_request = MarketOrderRequest::new(OrderSide::Buy, close_security, quantity);
        execution.close = self.submit(close_request).await;

        if !execution.close.is_filled() {
            warn!(
                leg = %execution.intent.leg,
                close = ?execution.close,
                "close leg did not fill, open leg not attempted"
            );
            return Ok(execution);
        }

        let resolved = timeout(
            self.call_timeout,
            self.resolver.resolve_option(
                &self.underlying,
                expiry,
                execution.intent.new_strike,
                kind,
            ),
        )
        .await;
        let open_security = match resolved {
            Ok(Ok(id)) => id,
            Ok(Err(err)) => {
                error!(error = %err, "replacement contract resolution failed, side left flat");
                execution.open = OrderLegStatus::Rejected {
                    reason: format!("instrument resolution failed: {err}"),
                };
                return Ok(execution);
            }
            Err(_) => {
                error!("replacement contract resolution timed out, side left flat");
                execution.open = OrderLegStatus::Rejected {
                    reason: "instrument resolution timed out".to_string(),
                };
                return Ok(execution);
            }
        };

        let open_request = MarketOrderRequest::new(OrderSide::Sell, open_security, quantity);
        execution.open = self.submit(open_request).await;

        if !execution.open.is_filled() {
            error!(
                leg = %execution.intent.leg,
                open = ?execution.open,
                "open leg failed after close fill, side left flat"
            );
        }

        Ok(execution)
    }

    async fn submit(&self, request: MarketOrderRequest) -> OrderLegStatus {
        match timeout(self.call_timeout, self.gateway.place_market_order(request)).await {
            Ok(Ok(OrderResult::Filled {
                broker_order_id,
                avg_price,
            })) => OrderLegStatus::Filled {
                broker_order_id,
                avg_price,
            },
            Ok(Ok(OrderResult::Rejected { reason })) => OrderLegStatus::Rejected { reason },
            // Timeouts mean the order may exist at the broker; never
            // downgrade that to a rejection.
            Ok(Ok(OrderResult::Unknown)) | Ok(Err(BrokerError::Timeout)) | Err(_) => {
                OrderLegStatus::Unknown
            }
            Ok(Err(err)) => OrderLegStatus::Rejected {
                reason: err.to_string(),
            },
        }
    }
}
