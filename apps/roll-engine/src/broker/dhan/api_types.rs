//! Dhan v2 API request/response types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{OptionKind, Position, SecurityId};
use crate::ports::{MarketOrderRequest, OrderSide};

/// One position from `GET /positions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhanPositionDto {
    /// Exchange trading symbol.
    pub trading_symbol: String,
    /// Security id for the contract.
    pub security_id: String,
    /// Signed net quantity.
    #[serde(default)]
    pub net_qty: Decimal,
    /// Average buy price.
    #[serde(default)]
    pub buy_avg: Decimal,
    /// Average sell price.
    #[serde(default)]
    pub sell_avg: Decimal,
    /// Realized profit.
    #[serde(default)]
    pub realized_profit: Decimal,
    /// Unrealized profit.
    #[serde(default)]
    pub unrealized_profit: Decimal,
    /// Derivative expiry date (`YYYY-MM-DD`, sometimes with a time).
    #[serde(default)]
    pub drv_expiry_date: Option<String>,
    /// Derivative option type (`CALL` / `PUT`).
    #[serde(default)]
    pub drv_option_type: Option<String>,
    /// Derivative strike price; `0` for non-options.
    #[serde(default)]
    pub drv_strike_price: Option<Decimal>,
}

impl From<DhanPositionDto> for Position {
    fn from(dto: DhanPositionDto) -> Self {
        let option_kind = dto.drv_option_type.as_deref().and_then(parse_option_type);
        let strike = dto.drv_strike_price.filter(|s| !s.is_zero());
        let expiry = dto.drv_expiry_date.as_deref().and_then(parse_expiry);
        let underlying = underlying_of(&dto.trading_symbol);

        Self {
            security_id: SecurityId::new(dto.security_id),
            trading_symbol: dto.trading_symbol,
            underlying,
            option_kind,
            strike,
            expiry,
            net_qty: dto.net_qty,
            buy_avg: dto.buy_avg,
            sell_avg: dto.sell_avg,
            realized_pnl: dto.realized_profit,
            unrealized_pnl: dto.unrealized_profit,
        }
    }
}

fn parse_option_type(raw: &str) -> Option<OptionKind> {
    match raw {
        "CALL" | "CE" => Some(OptionKind::Call),
        "PUT" | "PE" => Some(OptionKind::Put),
        _ => None,
    }
}

/// The expiry field sometimes carries a trailing timestamp; only the
/// date part is meaningful.
fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Underlying symbol from a trading symbol like `NIFTY-Sep2026-25000-CE`.
fn underlying_of(trading_symbol: &str) -> String {
    trading_symbol
        .split(['-', ' '])
        .next()
        .unwrap_or(trading_symbol)
        .to_string()
}

/// Order body for `POST /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DhanOrderRequest {
    /// Client id the order is placed under.
    pub dhan_client_id: String,
    /// Caller correlation id, echoed back by the API.
    pub correlation_id: String,
    /// `BUY` or `SELL`.
    pub transaction_type: String,
    /// Always `NSE_FNO` for index options.
    pub exchange_segment: String,
    /// Always `MARGIN` for carried-over option positions.
    pub product_type: String,
    /// Always `MARKET`.
    pub order_type: String,
    /// Always `DAY`.
    pub validity: String,
    /// Security id of the contract.
    pub security_id: String,
    /// Unsigned contract quantity.
    pub quantity: u64,
    /// Limit price; `0` for market orders.
    pub price: f64,
}

impl DhanOrderRequest {
    /// Build an order body from a port-level request.
    #[must_use]
    pub fn from_market_order(request: &MarketOrderRequest, client_id: &str) -> Self {
        use rust_decimal::prelude::ToPrimitive;

        let transaction_type = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        Self {
            dhan_client_id: client_id.to_string(),
            correlation_id: request.correlation_id.clone(),
            transaction_type: transaction_type.to_string(),
            exchange_segment: "NSE_FNO".to_string(),
            product_type: "MARGIN".to_string(),
            order_type: "MARKET".to_string(),
            validity: "DAY".to_string(),
            security_id: request.security_id.as_str().to_string(),
            quantity: request.quantity.abs().to_u64().unwrap_or(0),
            price: 0.0,
        }
    }
}

/// Response from `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhanOrderResponse {
    /// Broker-assigned order id.
    pub order_id: String,
    /// Initial order status (`TRANSIT`, `PENDING`, `REJECTED`, ...).
    pub order_status: String,
}

/// Order detail from `GET /orders/{order-id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhanOrderDetail {
    /// Broker-assigned order id.
    pub order_id: String,
    /// Current order status.
    pub order_status: String,
    /// Average traded price, once fills exist.
    #[serde(default)]
    pub average_traded_price: Option<Decimal>,
    /// OMS rejection reason, when rejected.
    #[serde(default)]
    pub oms_error_description: Option<String>,
}

/// Error body returned by the Dhan API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhanErrorResponse {
    /// Error category.
    #[serde(default)]
    pub error_type: Option<String>,
    /// Error code such as `DH-905`.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub error_message: Option<String>,
}
