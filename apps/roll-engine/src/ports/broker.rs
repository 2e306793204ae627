//! Broker ports: position source, order gateway, instrument resolution.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerOrderId, OptionKind, Position, SecurityId};

/// Transaction direction for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy (covers a short leg).
    Buy,
    /// Sell (establishes a short leg).
    Sell,
}

/// Request to place a market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    /// Transaction direction.
    pub side: OrderSide,
    /// Contract to trade.
    pub security_id: SecurityId,
    /// Unsigned quantity.
    pub quantity: Decimal,
    /// Caller-supplied correlation id, echoed by the broker.
    pub correlation_id: String,
}

impl MarketOrderRequest {
    /// Create a market order request with a fresh correlation id.
    #[must_use]
    pub fn new(side: OrderSide, security_id: SecurityId, quantity: Decimal) -> Self {
        Self {
            side,
            security_id,
            quantity,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Override the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// Terminal result of a market order submission.
///
/// `Unknown` means the broker accepted the order but its terminal state
/// could not be confirmed in time; it must never be assumed filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderResult {
    /// Order fully filled.
    Filled {
        /// Broker-assigned order id.
        broker_order_id: BrokerOrderId,
        /// Average fill price, when reported.
        avg_price: Option<Decimal>,
    },
    /// Order rejected by the broker.
    Rejected {
        /// Rejection reason.
        reason: String,
    },
    /// Terminal state unconfirmed within the allotted time.
    Unknown,
}

/// Broker interaction errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Connection or transport failure.
    #[error("broker connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Authentication failed (bad or missing credentials).
    #[error("broker authentication failed")]
    AuthenticationFailed,

    /// Broker rate limit exhausted.
    #[error("rate limited by broker")]
    RateLimited,

    /// Call exceeded its deadline.
    #[error("broker call timed out")]
    Timeout,

    /// Retries exhausted on a retryable failure.
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Attempts made.
        attempts: u32,
    },

    /// Broker returned an API-level error.
    #[error("broker API error {code}: {message}")]
    Api {
        /// Broker error code.
        code: String,
        /// Broker error message.
        message: String,
    },

    /// Response could not be parsed.
    #[error("broker response parse error: {0}")]
    Parse(String),
}

/// Source of live broker positions.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Fetch all current positions from the broker.
    async fn fetch_positions(&self) -> Result<Vec<Position>, BrokerError>;
}

/// Order placement gateway.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a market order and report its terminal result.
    async fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderResult, BrokerError>;
}

/// Resolves an option contract to its broker security id.
///
/// Needed to open the new leg of a roll: the broker addresses contracts
/// by security id, not by (strike, expiry) tuple.
#[async_trait]
pub trait InstrumentResolver: Send + Sync {
    /// Resolve the contract for `underlying`/`expiry`/`strike`/`kind`.
    async fn resolve_option(
        &self,
        underlying: &str,
        expiry: NaiveDate,
        strike: Decimal,
        kind: OptionKind,
    ) -> Result<SecurityId, BrokerError>;
}
