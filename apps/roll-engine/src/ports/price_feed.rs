//! Underlying price source port.

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Price feed errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceFeedError {
    /// No price available for the symbol.
    #[error("no price available for {symbol}")]
    DataUnavailable {
        /// The symbol queried.
        symbol: String,
    },

    /// Feed connection or transport failure.
    #[error("price feed error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Call exceeded its deadline.
    #[error("price feed call timed out")]
    Timeout,
}

/// Source of the underlying's last traded price.
#[async_trait]
pub trait UnderlyingPriceSource: Send + Sync {
    /// Last traded price for `symbol`.
    async fn last_price(&self, symbol: &str) -> Result<Decimal, PriceFeedError>;
}

/// Fixed-price source, configured at startup.
///
/// Stands in until a live market feed adapter is wired; also the fake of
/// choice in tests.
#[derive(Debug, Clone)]
pub struct StaticPriceSource {
    price: Decimal,
}

impl StaticPriceSource {
    /// Create a source that always reports `price`.
    #[must_use]
    pub const fn new(price: Decimal) -> Self {
        Self { price }
    }
}

#[async_trait]
impl UnderlyingPriceSource for StaticPriceSource {
    async fn last_price(&self, _symbol: &str) -> Result<Decimal, PriceFeedError> {
        Ok(self.price)
    }
}
