//! Instrument resolution against the Dhan scrip master.
//!
//! Dhan addresses contracts by security id. The published instrument
//! master CSV is the only mapping from (underlying, expiry, strike,
//! option type) to that id, so it is downloaded once and cached for the
//! life of the process. Only index option rows are kept.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::{OptionKind, SecurityId};
use crate::ports::{BrokerError, InstrumentResolver};

use super::config::DhanConfig;
use super::error::DhanError;

/// Columns of the detailed scrip master this adapter needs.
const COL_SECURITY_ID: &str = "SEM_SMST_SECURITY_ID";
const COL_INSTRUMENT: &str = "SEM_INSTRUMENT_NAME";
const COL_EXPIRY: &str = "SEM_EXPIRY_DATE";
const COL_STRIKE: &str = "SEM_STRIKE_PRICE";
const COL_OPTION_TYPE: &str = "SEM_OPTION_TYPE";
const COL_SYMBOL: &str = "SM_SYMBOL_NAME";

/// One index option row from the scrip master.
#[derive(Debug, Clone)]
struct ScripRow {
    security_id: String,
    symbol: String,
    expiry: Option<NaiveDate>,
    strike: Option<Decimal>,
    option_type: String,
}

/// Lazily-loaded, cached view of the Dhan instrument master.
#[derive(Debug)]
pub struct DhanScripMaster {
    http: Client,
    url: String,
    cache: RwLock<Option<Arc<Vec<ScripRow>>>>,
}

impl DhanScripMaster {
    /// Create a resolver reading from the configured scrip master URL.
    ///
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be built.
    pub fn new(config: &DhanConfig) -> Result<Self, DhanError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DhanError::Network(e.to_string()))?;
        Ok(Self {
            http,
            url: config.scrip_master_url.clone(),
            cache: RwLock::new(None),
        })
    }

    async fn rows(&self) -> Result<Arc<Vec<ScripRow>>, DhanError> {
        if let Some(rows) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(rows));
        }

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DhanError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DhanError::Http(format!(
                "scrip master fetch returned {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| DhanError::Network(e.to_string()))?;

        let rows = Arc::new(parse_scrip_master(&body)?);
        info!(rows = rows.len(), "scrip master loaded");
        *self.cache.write().await = Some(Arc::clone(&rows));
        Ok(rows)
    }
}

#[async_trait]
impl InstrumentResolver for DhanScripMaster {
    async fn resolve_option(
        &self,
        underlying: &str,
        expiry: NaiveDate,
        strike: Decimal,
        kind: OptionKind,
    ) -> Result<SecurityId, BrokerError> {
        let option_type = match kind {
            OptionKind::Call => "CE",
            OptionKind::Put => "PE",
        };

        let rows = self.rows().await?;
        let row = rows
            .iter()
            .find(|r| {
                r.symbol == underlying
                    && r.option_type == option_type
                    && r.expiry == Some(expiry)
                    && r.strike == Some(strike)
            })
            .ok_or_else(|| DhanError::InstrumentNotFound {
                query: format!("{underlying} {strike} {option_type} expiring {expiry}"),
            })?;

        Ok(SecurityId::new(row.security_id.clone()))
    }
}

/// Parse the scrip master CSV, keeping index option rows only.
///
/// Columns are located by header name so reordering in the published
/// file does not break the parse. Option rows carry no quoted commas.
fn parse_scrip_master(csv: &str) -> Result<Vec<ScripRow>, DhanError> {
    let mut lines = csv.lines();
    let header = lines
        .next()
        .ok_or_else(|| DhanError::ScripParse("empty scrip master".to_string()))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let index_of = |name: &str| -> Result<usize, DhanError> {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| DhanError::ScripParse(format!("missing column {name}")))
    };

    let security_id_idx = index_of(COL_SECURITY_ID)?;
    let instrument_idx = index_of(COL_INSTRUMENT)?;
    let expiry_idx = index_of(COL_EXPIRY)?;
    let strike_idx = index_of(COL_STRIKE)?;
    let option_type_idx = index_of(COL_OPTION_TYPE)?;
    let symbol_idx = index_of(COL_SYMBOL)?;

    let mut rows = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.get(instrument_idx).map(|f| f.trim()) != Some("OPTIDX") {
            continue;
        }
        let Some(security_id) = fields.get(security_id_idx).map(|f| f.trim()) else {
            continue;
        };
        let Some(symbol) = fields.get(symbol_idx).map(|f| f.trim()) else {
            continue;
        };

        rows.push(ScripRow {
            security_id: security_id.to_string(),
            symbol: symbol.to_string(),
            expiry: fields
                .get(expiry_idx)
                .and_then(|f| f.trim().get(..10))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            strike: fields
                .get(strike_idx)
                .and_then(|f| Decimal::from_str(f.trim()).ok()),
            option_type: fields
                .get(option_type_idx)
                .map(|f| f.trim().to_string())
                .unwrap_or_default(),
        });
    }

    Ok(rows)
}
