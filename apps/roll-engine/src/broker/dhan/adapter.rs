//! Dhan implementations of the broker ports.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::{BrokerOrderId, Position};
use crate::ports::{BrokerError, MarketOrderRequest, OrderGateway, OrderResult, PositionSource};

use super::api_types::{DhanOrderDetail, DhanOrderRequest, DhanOrderResponse, DhanPositionDto};
use super::config::DhanConfig;
use super::error::DhanError;
use super::http_client::DhanHttpClient;

/// Broker adapter over the Dhan v2 REST API.
///
/// Implements [`PositionSource`] and [`OrderGateway`]. Position reads
/// are retried; orders are submitted exactly once and then confirmed by
/// polling the order book until a terminal status or the poll deadline.
#[derive(Debug, Clone)]
pub struct DhanBrokerAdapter {
    http: DhanHttpClient,
    client_id: String,
    fill_poll_interval: Duration,
    fill_poll_timeout: Duration,
}

impl DhanBrokerAdapter {
    /// Create an adapter from config.
    ///
    /// # Errors
    ///
    /// Returns [`DhanError::AuthenticationFailed`] on empty credentials
    /// or a network error if the HTTP client cannot be built.
    pub fn new(config: &DhanConfig) -> Result<Self, DhanError> {
        Ok(Self {
            http: DhanHttpClient::new(config)?,
            client_id: config.client_id.clone(),
            fill_poll_interval: config.fill_poll_interval,
            fill_poll_timeout: config.fill_poll_timeout,
        })
    }

    /// Poll the order until it reaches a terminal status.
    ///
    /// Returns `Unknown` when the deadline passes first; the caller must
    /// treat that as unconfirmed, never as filled.
    async fn await_terminal(&self, order_id: &str) -> Result<OrderResult, DhanError> {
        let deadline = Instant::now() + self.fill_poll_timeout;

        loop {
            let detail: DhanOrderDetail = self.http.get(&format!("/orders/{order_id}")).await?;
            match detail.order_status.as_str() {
                "TRADED" => {
                    return Ok(OrderResult::Filled {
                        broker_order_id: BrokerOrderId::new(order_id),
                        avg_price: detail.average_traded_price,
                    });
                }
                "REJECTED" | "CANCELLED" | "EXPIRED" => {
                    return Ok(OrderResult::Rejected {
                        reason: detail
                            .oms_error_description
                            .unwrap_or_else(|| format!("order {}", detail.order_status)),
                    });
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                warn!(
                    order_id,
                    status = %detail.order_status,
                    "order did not reach a terminal state before the poll deadline"
                );
                return Ok(OrderResult::Unknown);
            }
            tokio::time::sleep(self.fill_poll_interval).await;
        }
    }
}

#[async_trait]
impl PositionSource for DhanBrokerAdapter {
    async fn fetch_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let dtos: Vec<DhanPositionDto> = self.http.get("/positions").await?;
        Ok(dtos.into_iter().map(Position::from).collect())
    }
}

#[async_trait]
impl OrderGateway for DhanBrokerAdapter {
    async fn place_market_order(
        &self,
        request: MarketOrderRequest,
    ) -> Result<OrderResult, BrokerError> {
        let body = DhanOrderRequest::from_market_order(&request, &self.client_id);
        info!(
            side = %body.transaction_type,
            security_id = %body.security_id,
            quantity = body.quantity,
            correlation_id = %body.correlation_id,
            "submitting market order"
        );

        let response: DhanOrderResponse = match self.http.post_once("/orders", &body).await {
            Ok(response) => response,
            // API-level refusal at submission: the order never reached
            // the exchange.
            Err(DhanError::Api { code, message }) => {
                return Ok(OrderResult::Rejected {
                    reason: format!("{code}: {message}"),
                });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            order_id = %response.order_id,
            status = %response.order_status,
            "order accepted, awaiting terminal status"
        );
        self.await_terminal(&response.order_id)
            .await
            .map_err(Into::into)
    }
}
