//! HTTP client wrapper with retry logic for read requests.
//!
//! Order submissions go through `post_once`: a market order that fails
//! in flight must not be replayed, because the first attempt may have
//! reached the exchange.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::DhanErrorResponse;
use super::config::{DhanConfig, RetryConfig};
use super::error::DhanError;

/// HTTP client for the Dhan API.
#[derive(Debug, Clone)]
pub struct DhanHttpClient {
    client: Client,
    access_token: String,
    client_id: String,
    base_url: String,
    retry_config: RetryConfig,
}

impl DhanHttpClient {
    /// Create a new HTTP client from config.
    pub fn new(config: &DhanConfig) -> Result<Self, DhanError> {
        if config.access_token.is_empty() || config.client_id.is_empty() {
            return Err(DhanError::AuthenticationFailed);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DhanError::Network(e.to_string()))?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            client_id: config.client_id.clone(),
            base_url: config.base_url.clone(),
            retry_config: config.retry.clone(),
        })
    }

    /// Make a GET request, retrying transient failures.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DhanError> {
        let url = format!("{}{path}", self.base_url);
        let mut backoff = ExponentialBackoff::new(&self.retry_config);

        loop {
            let request = self.with_auth(self.client.get(&url));
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Network error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(DhanError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                return parse_body(response).await;
            }

            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error = read_error(response).await;

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .or_else(|| backoff.next_backoff());
                    if let Some(delay) = delay {
                        tracing::warn!(
                            delay_ms = delay.as_millis(),
                            "Rate limited, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(DhanError::RateLimited {
                        retry_after_secs: retry_after.unwrap_or(60),
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            status = status.as_u16(),
                            error = %error,
                            delay_ms = delay.as_millis(),
                            "Retryable error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(DhanError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                    });
                }
                ErrorCategory::NonRetryable => return Err(error),
            }
        }
    }

    /// Make a POST request with no retries.
    #[allow(clippy::future_not_send)]
    pub async fn post_once<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DhanError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .with_auth(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| DhanError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return parse_body(response).await;
        }
        Err(read_error(response).await)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("access-token", &self.access_token)
            .header("client-id", &self.client_id)
            .header("Accept", "application/json")
    }
}

async fn parse_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DhanError> {
    let text = response
        .text()
        .await
        .map_err(|e| DhanError::Network(e.to_string()))?;
    if text.is_empty() {
        return serde_json::from_str("null").map_err(|e| DhanError::JsonParse(e.to_string()));
    }
    serde_json::from_str(&text).map_err(|e| DhanError::JsonParse(e.to_string()))
}

async fn read_error(response: reqwest::Response) -> DhanError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return DhanError::AuthenticationFailed;
    }

    match serde_json::from_str::<DhanErrorResponse>(&body) {
        Ok(err) => DhanError::Api {
            code: err
                .error_code
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: err.error_message.or(err.error_type).unwrap_or(body),
        },
        Err(_) => DhanError::Api {
            code: status.as_u16().to_string(),
            message: body,
        },
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}
