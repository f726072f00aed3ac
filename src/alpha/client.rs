//! Alpha Vantage API Client
//!
//! Every call hits the single `/query` endpoint with a `function` parameter.
//! The API key travels as the `apikey` query parameter on every request.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::*;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::request::{error_message, subset, ParamValue, RequestClient};
use crate::table::{ordered_fields, Cell, Table};

/// Query endpoint
pub const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Keys Alpha Vantage uses for errors and rate-limit notices in 200 responses
const NOTICE_KEYS: &[&str] = &["Error Message", "Note", "Information"];

pub struct AlphaClient {
    http: RequestClient,
}

impl AlphaClient {
    /// Create a client from `ALPHA_VANTAGE_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ALPHA_VANTAGE_API_KEY")
            .context("ALPHA_VANTAGE_API_KEY environment variable not set")?;
        Self::new(&ApiConfig::new(BASE_URL).with_env_overrides()?, api_key)
    }

    pub fn new(config: &ApiConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: RequestClient::new(config)?.with_default_param("apikey", api_key),
        })
    }

    /// Raw JSON for any `function`
    pub async fn get_generic(&self, params: &[(&str, ParamValue)]) -> Result<Value> {
        let value = self
            .http
            .get("", params)
            .await
            .context("Alpha Vantage request failed")?
            .into_json()?;
        Ok(value)
    }

    async fn query(&self, function: &str, params: &[(&str, ParamValue)]) -> Result<Value> {
        let mut all = vec![("function", ParamValue::from(function))];
        all.extend_from_slice(params);
        debug!("Alpha Vantage {}", function);
        self.get_generic(&all)
            .await
            .with_context(|| format!("{} request failed", function))
    }

    // =========================================================================
    // Time series
    // =========================================================================

    /// Fetch any declared series and reshape it into a date-indexed table
    pub async fn series(&self, series: &Series, params: &[(&str, ParamValue)]) -> Result<Table> {
        let value = self.query(series.function, params).await?;
        series_table(value, series)
    }

    pub async fn stock_intraday(&self, symbol: &str, interval: Interval, size: OutputSize) -> Result<Table> {
        info!("Fetching {} intraday ({}) from Alpha Vantage", symbol, interval);
        self.series(
            &Series::stock_intraday(interval),
            &[
                ("symbol", symbol.into()),
                ("interval", interval.as_str().into()),
                ("outputsize", size.as_str().into()),
            ],
        )
        .await
    }

    pub async fn stock_daily(&self, symbol: &str, size: OutputSize) -> Result<Table> {
        info!("Fetching {} daily from Alpha Vantage", symbol);
        self.series(
            &Series::stock_daily(),
            &[("symbol", symbol.into()), ("outputsize", size.as_str().into())],
        )
        .await
    }

    /// Premium endpoint
    pub async fn stock_daily_adjusted(&self, symbol: &str, size: OutputSize) -> Result<Table> {
        self.series(
            &Series::stock_daily_adjusted(),
            &[("symbol", symbol.into()), ("outputsize", size.as_str().into())],
        )
        .await
    }

    pub async fn stock_weekly(&self, symbol: &str) -> Result<Table> {
        self.series(&Series::stock_weekly(), &[("symbol", symbol.into())]).await
    }

    pub async fn stock_weekly_adjusted(&self, symbol: &str) -> Result<Table> {
        self.series(&Series::stock_weekly_adjusted(), &[("symbol", symbol.into())]).await
    }

    pub async fn stock_monthly(&self, symbol: &str) -> Result<Table> {
        self.series(&Series::stock_monthly(), &[("symbol", symbol.into())]).await
    }

    pub async fn stock_monthly_adjusted(&self, symbol: &str) -> Result<Table> {
        self.series(&Series::stock_monthly_adjusted(), &[("symbol", symbol.into())]).await
    }

    pub async fn fx_intraday(
        &self,
        from: &str,
        to: &str,
        interval: Interval,
        size: OutputSize,
    ) -> Result<Table> {
        self.series(
            &Series::fx_intraday(interval),
            &[
                ("from_symbol", from.into()),
                ("to_symbol", to.into()),
                ("interval", interval.as_str().into()),
                ("outputsize", size.as_str().into()),
            ],
        )
        .await
    }

    pub async fn fx_daily(&self, from: &str, to: &str, size: OutputSize) -> Result<Table> {
        self.series(
            &Series::fx_daily(),
            &[
                ("from_symbol", from.into()),
                ("to_symbol", to.into()),
                ("outputsize", size.as_str().into()),
            ],
        )
        .await
    }

    pub async fn fx_weekly(&self, from: &str, to: &str) -> Result<Table> {
        self.series(
            &Series::fx_weekly(),
            &[("from_symbol", from.into()), ("to_symbol", to.into())],
        )
        .await
    }

    pub async fn fx_monthly(&self, from: &str, to: &str) -> Result<Table> {
        self.series(
            &Series::fx_monthly(),
            &[("from_symbol", from.into()), ("to_symbol", to.into())],
        )
        .await
    }

    pub async fn crypto_intraday(
        &self,
        symbol: &str,
        market: &str,
        interval: Interval,
        size: OutputSize,
    ) -> Result<Table> {
        self.series(
            &Series::crypto_intraday(interval),
            &[
                ("symbol", symbol.into()),
                ("market", market.into()),
                ("interval", interval.as_str().into()),
                ("outputsize", size.as_str().into()),
            ],
        )
        .await
    }

    pub async fn crypto_daily(&self, symbol: &str, market: &str) -> Result<Table> {
        self.series(
            &Series::crypto_daily(),
            &[("symbol", symbol.into()), ("market", market.into())],
        )
        .await
    }

    pub async fn crypto_weekly(&self, symbol: &str, market: &str) -> Result<Table> {
        self.series(
            &Series::crypto_weekly(),
            &[("symbol", symbol.into()), ("market", market.into())],
        )
        .await
    }

    pub async fn crypto_monthly(&self, symbol: &str, market: &str) -> Result<Table> {
        self.series(
            &Series::crypto_monthly(),
            &[("symbol", symbol.into()), ("market", market.into())],
        )
        .await
    }

    /// SMA or EMA of `series_type` (close, open, high, low) over `time_period` bars.
    /// `interval` is an intraday size or `daily`, `weekly`, `monthly`.
    pub async fn moving_average(
        &self,
        symbol: &str,
        kind: MovingAverage,
        interval: &str,
        time_period: u32,
        series_type: &str,
    ) -> Result<Table> {
        self.series(
            &Series::moving_average(kind),
            &[
                ("symbol", symbol.into()),
                ("interval", interval.into()),
                ("time_period", time_period.into()),
                ("series_type", series_type.into()),
            ],
        )
        .await
    }

    // =========================================================================
    // Quotes and search
    // =========================================================================

    pub async fn symbol_search(&self, keywords: &str) -> Result<Table> {
        info!("Alpha Vantage symbol search '{}'", keywords);
        let value = self
            .query("SYMBOL_SEARCH", &[("keywords", keywords.into())])
            .await?;
        let matches = take(value, "bestMatches")?;
        let records = matches
            .as_array()
            .ok_or_else(|| ApiError::Shape("bestMatches is not an array".to_string()))?;
        let table = Table::from_records(
            records,
            Some(("1. symbol", "symbol")),
            &[
                ("2. name", "name"),
                ("3. type", "type"),
                ("4. region", "region"),
                ("5. marketOpen", "market_open"),
                ("6. marketClose", "market_close"),
                ("7. timezone", "timezone"),
                ("8. currency", "currency"),
                ("9. matchScore", "match_score"),
            ],
        )?;
        Ok(table)
    }

    pub async fn global_quote(&self, symbol: &str) -> Result<Table> {
        let value = self.query("GLOBAL_QUOTE", &[("symbol", symbol.into())]).await?;
        record_table(take(value, "Global Quote")?, GLOBAL_QUOTE)
    }

    pub async fn fx_quote(&self, from: &str, to: &str) -> Result<Table> {
        let value = self
            .query(
                "CURRENCY_EXCHANGE_RATE",
                &[("from_currency", from.into()), ("to_currency", to.into())],
            )
            .await?;
        record_table(take(value, "Realtime Currency Exchange Rate")?, EXCHANGE_RATE)
    }

    /// Same endpoint as [`fx_quote`](Self::fx_quote), for a crypto pair
    pub async fn crypto_quote(&self, from: &str, to: &str) -> Result<Table> {
        self.fx_quote(from, to).await
    }

    // =========================================================================
    // Currency lists (CSV)
    // =========================================================================

    pub async fn physical_currencies(&self) -> Result<Table> {
        self.currency_list("physical_currency_list/").await
    }

    pub async fn digital_currencies(&self) -> Result<Table> {
        self.currency_list("digital_currency_list/").await
    }

    /// The lists live beside `/query` and are served without a CSV content type
    async fn currency_list(&self, path: &str) -> Result<Table> {
        let root = self.http.base_url().trim_end_matches("/query");
        let url = format!("{}/{}", root, path);
        debug!("GET {}", url);

        let response = self
            .http
            .http()
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into());
        }

        let mut table = Table::from_csv(&body)?;
        table.index = "code".to_string();
        if table.columns.len() == 1 {
            table.set_columns(&["description"])?;
        }
        Ok(table)
    }
}

/// Unwrap `key`, turning Alpha Vantage's in-band notices into errors
fn take(value: Value, key: &str) -> Result<Value> {
    if value.get(key).is_none() {
        for notice in NOTICE_KEYS {
            if let Some(text) = value.get(*notice).and_then(Value::as_str) {
                warn!("Alpha Vantage notice: {}", text);
                return Err(anyhow!("Alpha Vantage: {}", text));
            }
        }
    }
    Ok(subset(value, key)?)
}

/// Reshape a time-series payload declared by `series`, oldest first.
///
/// Payloads whose field count differs from the declared columns (legacy
/// crypto layouts, indicators) keep their own field names in snake_case.
pub fn series_table(value: Value, series: &Series) -> Result<Table> {
    let data = take(value, &series.key)?;
    let map = data
        .as_object()
        .ok_or_else(|| ApiError::Shape(format!("'{}' is not an object", series.key)))?;

    let mut table = Table::from_keyed(map, "date", None)?;
    if !series.columns.is_empty() && table.columns.len() == series.columns.len() {
        table.set_columns(series.columns)?;
    } else {
        table.columns = table.columns.iter().map(|c| column_name(c)).collect();
    }
    table.sort_by_index();
    Ok(table)
}

/// One-row table from a numbered-field object (`"01. symbol"`, ...)
pub fn record_table(value: Value, columns: &[&str]) -> Result<Table> {
    let object = value
        .as_object()
        .ok_or_else(|| ApiError::Shape("quote is not an object".to_string()))?;
    let fields = ordered_fields(object);
    if fields.len() != columns.len() {
        return Err(ApiError::Shape(format!(
            "expected {} quote fields, got {}",
            columns.len(),
            fields.len()
        ))
        .into());
    }

    let mut values = fields.into_iter().map(|(_, v)| Cell::from_json(v).to_number());
    let key = values.next().unwrap_or(Cell::Null);
    let mut table = Table::new(columns[0], &columns[1..]);
    table.push(key, values.collect())?;
    Ok(table)
}

/// `"1a. open (ARS)"` -> `"open_ars"`, `"SMA"` -> `"sma"`
fn column_name(raw: &str) -> String {
    let name = match raw.split_once(". ") {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => raw,
    };
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
