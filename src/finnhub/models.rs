//! Finnhub request/response types

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::de::null_as_default;

/// `/search` match
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMatch {
    pub symbol: String,
    #[serde(default)]
    pub display_symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `/quote` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    /// Current price
    #[serde(rename = "c")]
    pub current: f64,
    #[serde(rename = "d", default)]
    pub change: Option<f64>,
    #[serde(rename = "dp", default)]
    pub percent_change: Option<f64>,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "pc")]
    pub previous_close: f64,
    /// Unix seconds
    #[serde(rename = "t", default)]
    pub timestamp: i64,
}

/// One trade inside a push message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeTick {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Unix milliseconds
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
}

/// Push message envelope; pings carry no `data`
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<TradeTick>,
}

/// Latest trade for one symbol on the board
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardRow {
    pub last_price: f64,
    pub volume: f64,
    pub datetime: Option<DateTime<Utc>>,
}
