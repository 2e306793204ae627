//! Trait seams for external collaborators.
//!
//! The engine only ever talks to the broker and the price feed through
//! these traits; production wiring uses the Dhan adapter, tests use
//! in-memory fakes.

mod broker;
mod price_feed;

pub use broker::{
    BrokerError, InstrumentResolver, MarketOrderRequest, OrderGateway, OrderResult, OrderSide,
    PositionSource,
};
pub use price_feed::{PriceFeedError, StaticPriceSource, UnderlyingPriceSource};

pub use crate::domain::BrokerOrderId;
