//! DefiLlama response types

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::de::{lenient_f64, lenient_i64, lenient_opt_f64, null_as_default};
use crate::table::Table;

/// One point of a TVL history (`/protocol/{slug}` `tvl`, `/charts`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TvlPoint {
    /// Unix seconds; `/charts` sends it as a string
    #[serde(deserialize_with = "lenient_i64")]
    pub date: i64,
    #[serde(rename = "totalLiquidityUSD", deserialize_with = "lenient_f64")]
    pub total_liquidity_usd: f64,
}

/// Token breakdown at one date (`tokensInUsd`, `tokens`)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPoint {
    #[serde(deserialize_with = "lenient_i64")]
    pub date: i64,
    #[serde(default)]
    pub tokens: BTreeMap<String, f64>,
}

/// Per-chain history inside `chainTvls`
#[derive(Debug, Clone, Deserialize)]
pub struct ChainHistory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tvl: Vec<TvlPoint>,
}

/// Entry of `/protocols`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub tvl: Option<f64>,
    #[serde(rename = "change_1d", default, deserialize_with = "lenient_opt_f64")]
    pub change_1d: Option<f64>,
    #[serde(rename = "change_7d", default, deserialize_with = "lenient_opt_f64")]
    pub change_7d: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub mcap: Option<f64>,
}

/// Entry of `/chains` (older payloads call the chain id field `chainId`)
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSummary {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub tvl: Option<f64>,
    #[serde(default, rename = "tokenSymbol")]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub gecko_id: Option<String>,
    #[serde(default, rename = "chainId")]
    pub chain_id: Option<Value>,
}

/// Raw `/protocol/{slug}` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tvl: Vec<TvlPoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub chain_tvls: BTreeMap<String, ChainHistory>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_chain_tvls: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_in_usd: Vec<TokenPoint>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens: Vec<TokenPoint>,
    /// Everything else (name, url, description, ...)
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

/// Reshaped `/protocol/{slug}`
#[derive(Debug, Clone)]
pub struct ProtocolHistory {
    pub metadata: BTreeMap<String, Value>,
    /// Date-indexed total TVL
    pub tvl: Table,
    /// Date-indexed TVL per chain, long format (`chain`, `tvl_usd`)
    pub chain_tvls: Table,
    /// Chain-indexed current TVL; `None` when the protocol reports none
    pub current_chain_tvls: Option<Table>,
    /// Date-indexed USD value per token
    pub tokens_usd: Option<Table>,
    /// Date-indexed token amounts
    pub tokens: Option<Table>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_protocol_summary_change_fields() {
        let summary: ProtocolSummary = serde_json::from_value(json!({
            "name": "Aave",
            "slug": "aave",
            "tvl": 10.0,
            "change_1d": 1.5,
            "change_7d": "-2.0",
            "mcap": 3.0
        }))
        .unwrap();
        assert_eq!(summary.change_1d, Some(1.5));
        assert_eq!(summary.change_7d, Some(-2.0));
        assert_eq!(summary.mcap, Some(3.0));
    }
}
