//! Primary (Matba-Rofex) gateway types

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;

use crate::de::{lenient_opt_f64, null_as_default};

/// Demo base URL
pub const REMARKETS_BASE_URL: &str = "https://api.remarkets.primary.com.ar";

/// Live base URL
pub const LIVE_BASE_URL: &str = "https://api.veta.xoms.com.ar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Remarkets,
    Live,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Remarkets => REMARKETS_BASE_URL,
            Self::Live => LIVE_BASE_URL,
        }
    }
}

/// Book and statistics entries of `/rest/marketdata/get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum MarketDataEntry {
    /// Best bids
    #[value(name = "BI")]
    Bids,
    /// Best offers
    #[value(name = "OF")]
    Offers,
    #[value(name = "LA")]
    Last,
    #[value(name = "OP")]
    OpeningPrice,
    #[value(name = "CL")]
    ClosingPrice,
    #[value(name = "SE")]
    SettlementPrice,
    #[value(name = "HI")]
    HighPrice,
    #[value(name = "LO")]
    LowPrice,
    #[value(name = "TV")]
    TradeVolume,
    #[value(name = "OI")]
    OpenInterest,
    #[value(name = "IV")]
    IndexValue,
    #[value(name = "EV")]
    TradeEffectiveVolume,
    #[value(name = "NV")]
    NominalVolume,
}

impl MarketDataEntry {
    pub const ALL: [Self; 13] = [
        Self::Bids,
        Self::Offers,
        Self::Last,
        Self::OpeningPrice,
        Self::ClosingPrice,
        Self::SettlementPrice,
        Self::HighPrice,
        Self::LowPrice,
        Self::TradeVolume,
        Self::OpenInterest,
        Self::IndexValue,
        Self::TradeEffectiveVolume,
        Self::NominalVolume,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Bids => "BI",
            Self::Offers => "OF",
            Self::Last => "LA",
            Self::OpeningPrice => "OP",
            Self::ClosingPrice => "CL",
            Self::SettlementPrice => "SE",
            Self::HighPrice => "HI",
            Self::LowPrice => "LO",
            Self::TradeVolume => "TV",
            Self::OpenInterest => "OI",
            Self::IndexValue => "IV",
            Self::TradeEffectiveVolume => "EV",
            Self::NominalVolume => "NV",
        }
    }
}

impl fmt::Display for MarketDataEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// CFI codes used to pick instrument families out of the detailed list
pub mod cficode {
    pub const LETTER: &str = "DYXTXR";
    pub const BOND: &str = "DBXXXX";
    pub const CORPORATE_BOND: &str = "DBXXFR";
    pub const CEDEAR: &str = "EMXXXX";
    pub const STOCK: &str = "ESXXXX";
    pub const INDEX: &str = "MRIXXX";
    pub const CAUCION: &str = "RPXXXX";
    pub const CALL: &str = "OCASPS";
    pub const PUT: &str = "OPASPS";
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentId {
    pub market_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub market_segment_id: String,
    pub market_id: String,
}

/// Entry of `/rest/instruments/all`
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentRef {
    #[serde(rename = "instrumentId")]
    pub instrument_id: InstrumentId,
    #[serde(default)]
    pub cficode: Option<String>,
}

/// Entry of `/rest/instruments/details` and `/rest/instruments/detail`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDetail {
    pub instrument_id: InstrumentId,
    #[serde(default)]
    pub security_description: Option<String>,
    #[serde(default)]
    pub cficode: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub segment: Option<Segment>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub min_price_increment: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub contract_multiplier: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub low_limit_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub high_limit_price: Option<f64>,
    /// `YYYYMMDD`
    #[serde(default)]
    pub maturity_date: Option<String>,
}

impl InstrumentDetail {
    /// Ticker inside `securityDescription` (`MERV - XMEV - GGAL - 48hs` -> `GGAL`)
    pub fn ticker(&self) -> Option<&str> {
        self.security_description
            .as_deref()?
            .split(" - ")
            .nth(2)
            .map(str::trim)
    }
}

// ============================================================================
// WebSocket market data
// ============================================================================

/// One price level or trade inside a `marketData` object
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PriceLevel {
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub size: Option<f64>,
    /// Epoch millis, only on `LA`
    #[serde(default)]
    pub date: Option<i64>,
}

/// `marketData` of an `Md` frame; entries not subscribed are absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDataUpdate {
    #[serde(rename = "BI", default, deserialize_with = "null_as_default")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "OF", default, deserialize_with = "null_as_default")]
    pub offers: Vec<PriceLevel>,
    #[serde(rename = "LA", default)]
    pub last: Option<PriceLevel>,
    #[serde(rename = "NV", default, deserialize_with = "lenient_opt_f64")]
    pub nominal_volume: Option<f64>,
    #[serde(rename = "EV", default, deserialize_with = "lenient_opt_f64")]
    pub effective_volume: Option<f64>,
}

/// Any frame pushed by the gateway socket
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub instrument_id: Option<InstrumentId>,
    #[serde(default)]
    pub market_data: Option<MarketDataUpdate>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Top of book and last trade for one instrument on the board
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookRow {
    pub bid_size: Option<f64>,
    pub bid: Option<f64>,
    pub offer: Option<f64>,
    pub offer_size: Option<f64>,
    pub last: Option<f64>,
    pub last_size: Option<f64>,
    pub nominal_volume: Option<f64>,
    pub effective_volume: Option<f64>,
    pub datetime: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_ticker() {
        let detail: InstrumentDetail = serde_json::from_value(json!({
            "instrumentId": {"marketId": "ROFX", "symbol": "MERV - XMEV - GGAL - 48hs"},
            "securityDescription": "MERV - XMEV - GGAL - 48hs",
            "cficode": "ESXXXX",
            "minPriceIncrement": "0.05"
        }))
        .unwrap();
        assert_eq!(detail.ticker(), Some("GGAL"));
        assert_eq!(detail.min_price_increment, Some(0.05));
    }

    #[test]
    fn test_entry_codes() {
        let codes: Vec<&str> = MarketDataEntry::ALL.iter().map(|e| e.code()).collect();
        assert_eq!(codes.join(","), "BI,OF,LA,OP,CL,SE,HI,LO,TV,OI,IV,EV,NV");
        assert_eq!(Environment::Live.base_url(), LIVE_BASE_URL);
    }
}
