//! Configuration loading and validation.
//!
//! Configuration comes from a YAML file with `${VAR}` / `${VAR:-default}`
//! environment variable interpolation, so secrets stay out of the file.
//!
//! # Usage
//!
//! ```rust,ignore
//! use roll_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//! ```

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::dhan::{DhanConfig, RetryConfig};
use crate::engine::EngineSettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Broker configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Reconciliation engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for the admin/query surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            bind_address: default_bind_address(),
        }
    }
}

const fn default_http_port() -> u16 {
    8080
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokerConfig {
    /// Dhan broker configuration.
    #[serde(default)]
    pub dhan: DhanBrokerConfig,
}

/// Dhan broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhanBrokerConfig {
    /// API access token (from environment variable).
    #[serde(default)]
    pub access_token: String,
    /// Dhan client id.
    #[serde(default)]
    pub client_id: String,
    /// REST API base URL.
    #[serde(default = "default_dhan_base_url")]
    pub base_url: String,
    /// Instrument master CSV URL.
    #[serde(default = "default_scrip_master_url")]
    pub scrip_master_url: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_broker_timeout")]
    pub timeout_secs: u64,
    /// Delay between fill-confirmation polls in milliseconds.
    #[serde(default = "default_fill_poll_interval")]
    pub fill_poll_interval_ms: u64,
    /// Total fill-confirmation deadline in seconds.
    #[serde(default = "default_fill_poll_timeout")]
    pub fill_poll_timeout_secs: u64,
    /// Maximum retry attempts for read requests.
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
}

impl Default for DhanBrokerConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            client_id: String::new(),
            base_url: default_dhan_base_url(),
            scrip_master_url: default_scrip_master_url(),
            timeout_secs: default_broker_timeout(),
            fill_poll_interval_ms: default_fill_poll_interval(),
            fill_poll_timeout_secs: default_fill_poll_timeout(),
            retry_max_attempts: default_retry_attempts(),
        }
    }
}

impl DhanBrokerConfig {
    /// Convert to the adapter-level [`DhanConfig`].
    #[must_use]
    pub fn to_adapter_config(&self) -> DhanConfig {
        DhanConfig::new(self.access_token.clone(), self.client_id.clone())
            .with_base_url(self.base_url.clone())
            .with_scrip_master_url(self.scrip_master_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_fill_polling(
                Duration::from_millis(self.fill_poll_interval_ms),
                Duration::from_secs(self.fill_poll_timeout_secs),
            )
            .with_retry(RetryConfig {
                max_attempts: self.retry_max_attempts,
                ..RetryConfig::default()
            })
    }
}

fn default_dhan_base_url() -> String {
    crate::broker::dhan::DEFAULT_BASE_URL.to_string()
}
fn default_scrip_master_url() -> String {
    crate::broker::dhan::DEFAULT_SCRIP_MASTER_URL.to_string()
}
const fn default_broker_timeout() -> u64 {
    30
}
const fn default_fill_poll_interval() -> u64 {
    500
}
const fn default_fill_poll_timeout() -> u64 {
    20
}
const fn default_retry_attempts() -> u32 {
    3
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Underlying symbol the strangle is written on.
    #[serde(default = "default_underlying")]
    pub underlying: String,
    /// Points to move a strike per roll.
    #[serde(default = "default_strike_step")]
    pub strike_step: Decimal,
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Deadline in seconds for each broker or price-feed call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Maximum roll records retained in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Fixed underlying price reported by the static price source.
    #[serde(default = "default_underlying_price")]
    pub underlying_price: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            underlying: default_underlying(),
            strike_step: default_strike_step(),
            interval_secs: default_interval(),
            call_timeout_secs: default_call_timeout(),
            history_limit: default_history_limit(),
            underlying_price: default_underlying_price(),
        }
    }
}

impl EngineConfig {
    /// Convert to engine-level [`EngineSettings`].
    #[must_use]
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            interval: Duration::from_secs(self.interval_secs),
            strike_step: self.strike_step,
            underlying: self.underlying.clone(),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            history_limit: self.history_limit,
        }
    }
}

fn default_underlying() -> String {
    "NIFTY".to_string()
}
fn default_strike_step() -> Decimal {
    Decimal::ONE_HUNDRED
}
const fn default_interval() -> u64 {
    10
}
const fn default_call_timeout() -> u64 {
    10
}
const fn default_history_limit() -> usize {
    100
}
fn default_underlying_price() -> Decimal {
    Decimal::ZERO
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.underlying.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.underlying must not be empty".to_string(),
        ));
    }

    if config.engine.strike_step <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "engine.strike_step must be positive".to_string(),
        ));
    }

    if config.engine.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.interval_secs must be positive".to_string(),
        ));
    }

    if config.engine.history_limit == 0 {
        return Err(ConfigError::ValidationError(
            "engine.history_limit must be positive".to_string(),
        ));
    }

    if config.engine.underlying_price <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "engine.underlying_price must be positive".to_string(),
        ));
    }

    if config.broker.dhan.retry_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "broker.dhan.retry_max_attempts must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minimal_config_gets_defaults() {
        let yaml = "
engine:
  underlying_price: 25000
";
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.engine.underlying, "NIFTY");
        assert_eq!(config.engine.strike_step, dec!(100));
        assert_eq!(config.engine.interval_secs, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
server:
  http_port: 9090
  bind_address: "127.0.0.1"

broker:
  dhan:
    access_token: "token"
    client_id: "1000000009"
    base_url: "http://localhost:8099"
    timeout_secs: 5
    retry_max_attempts: 2

engine:
  underlying: "NIFTY"
  strike_step: 50
  interval_secs: 30
  call_timeout_secs: 5
  history_limit: 20
  underlying_price: 25000

logging:
  level: "debug"
  format: "pretty"
"#;
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };
        assert_eq!(config.server.http_port, 9090);
        assert_eq!(config.broker.dhan.client_id, "1000000009");
        assert_eq!(config.engine.strike_step, dec!(50));
        assert_eq!(config.engine.history_limit, 20);
        assert_eq!(config.logging.format, "pretty");

        let settings = config.engine.to_settings();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.strike_step, dec!(50));

        let dhan = config.broker.dhan.to_adapter_config();
        assert_eq!(dhan.base_url, "http://localhost:8099");
        assert_eq!(dhan.retry.max_attempts, 2);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "token: ${ROLL_ENGINE_TEST_NONEXISTENT_VAR:-fallback}";
        assert_eq!(interpolate_env_vars(input), "token: fallback");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "token: ${ROLL_ENGINE_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "token: ");
    }

    #[test]
    fn zero_strike_step_is_rejected() {
        let yaml = "
engine:
  strike_step: 0
  underlying_price: 25000
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for zero strike step");
        };
        assert!(err.to_string().contains("strike_step"));
    }

    #[test]
    fn empty_underlying_is_rejected() {
        let yaml = r#"
engine:
  underlying: ""
  underlying_price: 25000
"#;
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for empty underlying");
        };
        assert!(err.to_string().contains("underlying"));
    }

    #[test]
    fn missing_underlying_price_is_rejected() {
        let Err(err) = load_config_from_string("{}") else {
            panic!("expected error for missing underlying price");
        };
        assert!(err.to_string().contains("underlying_price"));
    }
}
