//! Dhan-specific error types.

use thiserror::Error;

use crate::ports::BrokerError;

/// Errors from the Dhan adapter.
#[derive(Debug, Error, Clone)]
pub enum DhanError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// API returned an error.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Network error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Scrip master CSV could not be parsed.
    #[error("scrip master parse error: {0}")]
    ScripParse(String),

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// No instrument in the scrip master matched the query.
    #[error("instrument not found: {query}")]
    InstrumentNotFound {
        /// Human-readable description of the lookup.
        query: String,
    },
}

impl From<DhanError> for BrokerError {
    fn from(err: DhanError) -> Self {
        match err {
            DhanError::Http(msg) | DhanError::Network(msg) => Self::Connection { message: msg },
            DhanError::JsonParse(msg) | DhanError::ScripParse(msg) => Self::Parse(msg),
            DhanError::Api { code, message } => Self::Api { code, message },
            DhanError::AuthenticationFailed => Self::AuthenticationFailed,
            DhanError::RateLimited { .. } => Self::RateLimited,
            DhanError::MaxRetriesExceeded { attempts } => Self::MaxRetriesExceeded { attempts },
            DhanError::InstrumentNotFound { query } => Self::Api {
                code: "SCRIP_NOT_FOUND".to_string(),
                message: query,
            },
        }
    }
}
