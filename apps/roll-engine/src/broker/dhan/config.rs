//! Dhan adapter configuration.

use std::time::Duration;

/// Production base URL for the Dhan v2 REST API.
pub const DEFAULT_BASE_URL: &str = "https://api.dhan.co/v2";

/// Published instrument master (detailed CSV).
pub const DEFAULT_SCRIP_MASTER_URL: &str =
    "https://images.dhan.co/api-data/api-scrip-master.csv";

/// Configuration for the Dhan broker adapter.
#[derive(Debug, Clone)]
pub struct DhanConfig {
    /// API access token.
    pub access_token: String,
    /// Dhan client id, sent as a header and in order bodies.
    pub client_id: String,
    /// REST API base URL.
    pub base_url: String,
    /// Instrument master CSV URL.
    pub scrip_master_url: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Delay between fill-confirmation polls.
    pub fill_poll_interval: Duration,
    /// Total time to wait for an order to reach a terminal state.
    pub fill_poll_timeout: Duration,
    /// Retry policy for read requests.
    pub retry: RetryConfig,
}

impl DhanConfig {
    /// Create a configuration with production defaults.
    #[must_use]
    pub fn new(access_token: String, client_id: String) -> Self {
        Self {
            access_token,
            client_id,
            base_url: DEFAULT_BASE_URL.to_string(),
            scrip_master_url: DEFAULT_SCRIP_MASTER_URL.to_string(),
            timeout: Duration::from_secs(30),
            fill_poll_interval: Duration::from_millis(500),
            fill_poll_timeout: Duration::from_secs(20),
            retry: RetryConfig::default(),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the instrument master URL.
    #[must_use]
    pub fn with_scrip_master_url(mut self, url: impl Into<String>) -> Self {
        self.scrip_master_url = url.into();
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the fill-confirmation polling cadence and deadline.
    #[must_use]
    pub const fn with_fill_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.fill_poll_interval = interval;
        self.fill_poll_timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry configuration for read requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}
