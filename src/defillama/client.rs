//! DefiLlama API Client
//!
//! Unauthenticated client for the DefiLlama TVL endpoints.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::models::*;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::request::{subset, RequestClient};
use crate::table::{unix_seconds_to_date, Cell, Table};

/// Public API base URL
pub const BASE_URL: &str = "https://api.llama.fi";

pub struct DefiLlamaClient {
    http: RequestClient,
}

impl DefiLlamaClient {
    /// Client against the public API, honouring `APYS_*` overrides
    pub fn from_env() -> Result<Self> {
        Self::new(&ApiConfig::new(BASE_URL).with_env_overrides()?)
    }

    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            http: RequestClient::new(config)?,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let value = self
            .http
            .get(path, &[])
            .await
            .with_context(|| format!("Failed to fetch {}", path))?
            .into_json()?;
        Ok(value)
    }

    // =========================================================================
    // Protocols
    // =========================================================================

    /// All tracked protocols, indexed by name
    pub async fn protocols(&self) -> Result<Table> {
        info!("Fetching DefiLlama protocol list");
        let value = self.get_json("protocols").await?;
        let protocols: Vec<ProtocolSummary> =
            serde_json::from_value(value).context("Failed to parse protocol list")?;

        let mut table = Table::new(
            "name",
            &["slug", "symbol", "chain", "category", "tvl", "change_1d", "change_7d", "mcap"],
        );
        for p in protocols {
            table.push(
                p.name,
                vec![
                    p.slug.into(),
                    p.symbol.into(),
                    p.chain.into(),
                    p.category.into(),
                    p.tvl.into(),
                    p.change_1d.into(),
                    p.change_7d.into(),
                    p.mcap.into(),
                ],
            )?;
        }
        debug!("Got {} protocols", table.len());
        Ok(table)
    }

    /// Historical TVL of one protocol, split by chain and token
    pub async fn protocol(&self, slug: &str) -> Result<ProtocolHistory> {
        info!("Fetching DefiLlama protocol '{}'", slug);
        let value = self.get_json(&format!("protocol/{}", slug)).await?;
        protocol_history(value).with_context(|| format!("Failed to reshape protocol '{}'", slug))
    }

    /// Current TVL of one protocol as a plain number
    pub async fn protocol_tvl(&self, slug: &str) -> Result<f64> {
        let value = self.get_json(&format!("tvl/{}", slug)).await?;
        value
            .as_f64()
            .ok_or_else(|| ApiError::Shape(format!("expected a number, got {}", value)).into())
    }

    // =========================================================================
    // Charts and chains
    // =========================================================================

    /// Total DeFi TVL across all chains
    pub async fn charts(&self) -> Result<Table> {
        let value = self.get_json("charts").await?;
        tvl_series(value).context("Failed to reshape TVL chart")
    }

    /// TVL history of one chain
    pub async fn chart_chain(&self, chain: &str) -> Result<Table> {
        let value = self.get_json(&format!("charts/{}", chain)).await?;
        tvl_series(value).with_context(|| format!("Failed to reshape TVL chart for {}", chain))
    }

    /// Current TVL of every chain, indexed by name
    pub async fn chains(&self) -> Result<Table> {
        let value = self.get_json("chains").await?;
        let chains: Vec<ChainSummary> =
            serde_json::from_value(value).context("Failed to parse chain list")?;

        let mut table = Table::new("name", &["tvl", "token_symbol", "gecko_id", "chain_id"]);
        for c in chains {
            let chain_id = c.chain_id.as_ref().map(Cell::from_json).unwrap_or(Cell::Null);
            table.push(
                c.name,
                vec![c.tvl.into(), c.token_symbol.into(), c.gecko_id.into(), chain_id],
            )?;
        }
        Ok(table)
    }
}

/// Reshape the `tvl` key of a protocol payload into a date-indexed table
pub fn tvl_table(value: Value) -> crate::error::Result<Table> {
    tvl_series(subset(value, "tvl")?)
}

/// `[{date, totalLiquidityUSD}]` into a date-indexed table
fn tvl_series(value: Value) -> crate::error::Result<Table> {
    let points: Vec<TvlPoint> = serde_json::from_value(value)?;
    points_table(&points)
}

fn points_table(points: &[TvlPoint]) -> crate::error::Result<Table> {
    let mut table = Table::new("date", &["totalLiquidityUSD"]);
    for point in points {
        table.push(date_cell(point.date), vec![Cell::Float(point.total_liquidity_usd)])?;
    }
    Ok(table)
}

fn date_cell(secs: i64) -> Cell {
    unix_seconds_to_date(secs).map(Cell::Date).unwrap_or(Cell::Int(secs))
}

fn token_table(points: &[TokenPoint]) -> crate::error::Result<Option<Table>> {
    if points.is_empty() {
        return Ok(None);
    }
    let mut names: Vec<&str> = points
        .iter()
        .flat_map(|p| p.tokens.keys().map(String::as_str))
        .collect();
    names.sort_unstable();
    names.dedup();

    let mut table = Table::new("date", &names);
    for point in points {
        let values = names
            .iter()
            .map(|name| point.tokens.get(*name).copied().into())
            .collect();
        table.push(date_cell(point.date), values)?;
    }
    Ok(Some(table))
}

/// Split a `/protocol/{slug}` payload into its tables
pub fn protocol_history(value: Value) -> crate::error::Result<ProtocolHistory> {
    let payload: ProtocolPayload = serde_json::from_value(value)?;

    let mut chain_tvls = Table::new("date", &["chain", "tvl_usd"]);
    for (chain, history) in &payload.chain_tvls {
        for point in &history.tvl {
            chain_tvls.push(
                date_cell(point.date),
                vec![Cell::from(chain.as_str()), Cell::Float(point.total_liquidity_usd)],
            )?;
        }
    }

    let current_chain_tvls = if payload.current_chain_tvls.is_empty() {
        None
    } else {
        let mut table = Table::new("chain", &["tvl_usd"]);
        for (chain, tvl) in &payload.current_chain_tvls {
            table.push(chain.as_str(), vec![Cell::Float(*tvl)])?;
        }
        Some(table)
    };

    Ok(ProtocolHistory {
        tvl: points_table(&payload.tvl)?,
        chain_tvls,
        current_chain_tvls,
        tokens_usd: token_table(&payload.tokens_in_usd)?,
        tokens: token_table(&payload.tokens)?,
        metadata: payload.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_tvl_table_single_point() {
        let value = json!({"tvl": [{"date": 1700000000, "totalLiquidityUSD": 123.4}]});
        let table = tvl_table(value).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.index, "date");
        let date = Cell::Date(NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(table.get(&date, "totalLiquidityUSD"), Some(&Cell::Float(123.4)));
    }

    #[test]
    fn test_tvl_table_missing_key() {
        let err = tvl_table(json!({"name": "aave"})).unwrap_err();
        assert!(matches!(err, ApiError::MissingKey(k) if k == "tvl"));
    }

    #[test]
    fn test_chart_dates_as_strings() {
        let table = tvl_series(json!([
            {"date": "1530230400", "totalLiquidityUSD": 20541.94},
            {"date": "1530316800", "totalLiquidityUSD": "20742.83"}
        ]))
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows[0].key,
            Cell::Date(NaiveDate::from_ymd_opt(2018, 6, 29).unwrap())
        );
        assert_eq!(table.rows[1].values[0], Cell::Float(20742.83));
    }

    #[test]
    fn test_protocol_history_splits_tables() {
        let value = json!({
            "name": "Aave",
            "url": "https://aave.com",
            "tvl": [{"date": 1700000000, "totalLiquidityUSD": 10.0}],
            "chainTvls": {
                "Ethereum": {"tvl": [{"date": 1700000000, "totalLiquidityUSD": 7.0}]},
                "Polygon": {"tvl": [{"date": 1700000000, "totalLiquidityUSD": 3.0}]}
            },
            "currentChainTvls": {"Ethereum": 7.5, "Polygon": 3.5},
            "tokensInUsd": [{"date": 1700000000, "tokens": {"USDC": 4.0, "WETH": 6.0}}],
            "tokens": null
        });

        let history = protocol_history(value).unwrap();
        assert_eq!(history.tvl.len(), 1);
        assert_eq!(history.chain_tvls.len(), 2);
        assert_eq!(history.metadata.get("name"), Some(&json!("Aave")));

        let current = history.current_chain_tvls.unwrap();
        assert_eq!(current.get(&Cell::from("Polygon"), "tvl_usd"), Some(&Cell::Float(3.5)));

        let tokens_usd = history.tokens_usd.unwrap();
        assert_eq!(tokens_usd.columns, vec!["USDC", "WETH"]);
        assert!(history.tokens.is_none());
    }
}
