//! Finnhub REST Client
//!
//! Every request carries the API key as the `token` query parameter.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::models::*;
use crate::config::ApiConfig;
use crate::request::{subset, ParamValue, RequestClient};
use crate::table::{unix_seconds_to_date, Cell, Table};

/// REST base URL
pub const BASE_URL: &str = "https://finnhub.io/api/v1";

pub struct FinnhubClient {
    http: RequestClient,
    api_key: String,
}

impl FinnhubClient {
    /// Create a client from `FINNHUB_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FINNHUB_API_KEY")
            .context("FINNHUB_API_KEY environment variable not set")?;
        Self::new(&ApiConfig::new(BASE_URL).with_env_overrides()?, api_key)
    }

    pub fn new(config: &ApiConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        Ok(Self {
            http: RequestClient::new(config)?.with_default_param("token", api_key.clone()),
            api_key,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn get_json(&self, path: &str, params: &[(&str, ParamValue)]) -> Result<Value> {
        let value = self
            .http
            .get(path, params)
            .await
            .with_context(|| format!("Finnhub request to {} failed", path))?
            .into_json()?;
        Ok(value)
    }

    /// Raw JSON from any endpoint
    pub async fn get_generic(&self, path: &str, params: &[(&str, ParamValue)]) -> Result<Value> {
        self.get_json(path, params).await
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    /// Symbols matching `query`, indexed by symbol
    pub async fn symbol_lookup(&self, query: &str) -> Result<Table> {
        info!("Finnhub symbol lookup '{}'", query);
        let value = self.get_json("search", &[("q", query.into())]).await?;
        let matches: Vec<SymbolMatch> = serde_json::from_value(subset(value, "result")?)
            .context("Failed to parse symbol matches")?;

        let mut table = Table::new("symbol", &["display_symbol", "desc", "type"]);
        for m in matches {
            table.push(
                m.symbol,
                vec![m.display_symbol.into(), m.description.into(), m.kind.into()],
            )?;
        }
        debug!("{} matches for '{}'", table.len(), query);
        Ok(table)
    }

    /// Supported crypto exchanges
    pub async fn crypto_exchanges(&self) -> Result<Vec<String>> {
        let value = self.get_json("crypto/exchange", &[]).await?;
        serde_json::from_value(value).context("Failed to parse crypto exchange list")
    }

    // =========================================================================
    // Prices
    // =========================================================================

    pub async fn quote(&self, symbol: &str) -> Result<Quote> {
        let value = self.get_json("quote", &[("symbol", symbol.into())]).await?;
        serde_json::from_value(value).with_context(|| format!("Failed to parse quote for {}", symbol))
    }
}

/// One-row table for a quote, indexed by symbol
pub fn quote_table(symbol: &str, quote: &Quote) -> Result<Table> {
    let mut table = Table::new(
        "symbol",
        &["date", "open", "high", "low", "close", "prev_close", "change", "pct_change"],
    );
    let date = unix_seconds_to_date(quote.timestamp).map(Cell::Date).unwrap_or(Cell::Null);
    table.push(
        symbol,
        vec![
            date,
            quote.open.into(),
            quote.high.into(),
            quote.low.into(),
            quote.current.into(),
            quote.previous_close.into(),
            quote.change.into(),
            quote.percent_change.into(),
        ],
    )?;
    Ok(table)
}
