//! Dhan REST API adapter.
//!
//! Implements the broker ports against Dhan's v2 trading API. Reads are
//! retried with exponential backoff; order submissions go out exactly
//! once and fills are confirmed by polling the order book.

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;
mod scrip_master;

pub use adapter::DhanBrokerAdapter;
pub use config::{DEFAULT_BASE_URL, DEFAULT_SCRIP_MASTER_URL, DhanConfig, RetryConfig};
pub use error::DhanError;
pub use scrip_master::DhanScripMaster;
