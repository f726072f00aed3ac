//! Primary API Client
//!
//! REST client for the Matba-Rofex trading gateway. Login exchanges
//! username and password for an `X-Auth-Token` header value that is sent
//! on every later request.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::models::*;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::request::{error_message, ParamValue, RequestClient};
use crate::table::{Cell, Table};
use crate::token::{ensure_fresh, Login, RefreshPolicy, Token};

/// Gateway tokens carry no expiry; assume one day
const TOKEN_VALIDITY_HOURS: i64 = 24;

pub struct PrimaryClient {
    http: RequestClient,
    user: String,
    password: String,
    account: Option<String>,
    policy: RefreshPolicy,
}

impl PrimaryClient {
    /// Create a new client from environment variables
    ///
    /// Expects:
    /// - `PRIMARY_USER` - Gateway user
    /// - `PRIMARY_PASSWORD` - Gateway password
    /// - `PRIMARY_ACCOUNT` (optional) - Trading account
    /// - `PRIMARY_LIVE` (optional) - Set to "true" for the live gateway
    pub fn from_env() -> Result<Self> {
        let user = std::env::var("PRIMARY_USER").context("PRIMARY_USER environment variable not set")?;
        let password = std::env::var("PRIMARY_PASSWORD")
            .context("PRIMARY_PASSWORD environment variable not set")?;
        let account = std::env::var("PRIMARY_ACCOUNT").ok();
        let environment = if std::env::var("PRIMARY_LIVE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false)
        {
            Environment::Live
        } else {
            Environment::Remarkets
        };

        let config = ApiConfig::new(environment.base_url()).with_env_overrides()?;
        Ok(Self::new(&config, user, password)?.with_account(account))
    }

    pub fn new(config: &ApiConfig, user: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: RequestClient::new(config)?,
            user: user.into(),
            password: password.into(),
            account: None,
            policy: RefreshPolicy::default(),
        })
    }

    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Return `current` if it is still fresh, otherwise log in again
    ///
    /// Call this before each batch of endpoint calls. Endpoints refuse an
    /// expired token instead of refreshing it.
    pub async fn fresh_token(&self, current: Option<Token>) -> Result<Token> {
        ensure_fresh(self, current, Utc::now(), self.policy).await
    }

    async fn request_token(&self, now: DateTime<Utc>) -> Result<Token> {
        let url = self.http.url("auth/getToken");
        info!("Authenticating with Primary gateway at {}...", url);

        let response = self
            .http
            .http()
            .post(&url)
            .header("X-Username", &self.user)
            .header("X-Password", &self.password)
            .send()
            .await
            .context("Failed to send authentication request")?;

        let status = response.status();
        let token = response
            .headers()
            .get("X-Auth-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            })
            .context("Primary authentication failed");
        }

        let token = token.ok_or_else(|| anyhow!("Authentication response has no X-Auth-Token header"))?;
        info!("Authenticated with Primary gateway");
        Ok(Token::new(token, now + Duration::hours(TOKEN_VALIDITY_HOURS)))
    }

    async fn get(&self, token: &Token, path: &str, params: &[(&str, ParamValue)]) -> Result<Value> {
        if token.is_expired(Utc::now()) {
            return Err(anyhow!(
                "Primary token expired at {}, pass it through fresh_token first",
                token.format_expiry()
            ));
        }
        debug!("Primary GET {}", path);
        let value = self
            .http
            .get_with_headers(path, &[("X-Auth-Token", token.access_token.clone())], params)
            .await
            .with_context(|| format!("Primary request to {} failed", path))?
            .into_json()?;
        check_status(value)
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    /// Market segments
    pub async fn segments(&self, token: &Token) -> Result<Table> {
        let value = self.get(token, "rest/segment/all", &[]).await?;
        let segments: Vec<Segment> = serde_json::from_value(take(value, "segments")?)?;

        let mut table = Table::new("segment", &["market"]);
        for s in segments {
            table.push(s.market_segment_id, vec![s.market_id.into()])?;
        }
        Ok(table)
    }

    /// Every listed instrument, symbol and CFI code only
    pub async fn instruments(&self, token: &Token) -> Result<Table> {
        let value = self.get(token, "rest/instruments/all", &[]).await?;
        let instruments: Vec<InstrumentRef> = serde_json::from_value(take(value, "instruments")?)?;

        let mut table = Table::new("symbol", &["market", "cficode"]);
        for i in instruments {
            table.push(
                i.instrument_id.symbol,
                vec![i.instrument_id.market_id.into(), i.cficode.into()],
            )?;
        }
        info!("Primary lists {} instruments", table.len());
        Ok(table)
    }

    async fn detailed(&self, token: &Token) -> Result<Vec<InstrumentDetail>> {
        let value = self.get(token, "rest/instruments/details", &[]).await?;
        serde_json::from_value(take(value, "instruments")?).context("Failed to parse instrument details")
    }

    /// Every listed instrument with its contract details
    pub async fn detailed_instruments(&self, token: &Token) -> Result<Table> {
        Ok(details_table(&self.detailed(token).await?)?)
    }

    pub async fn instrument_detail(&self, token: &Token, symbol: &str, market: &str) -> Result<Table> {
        let value = self
            .get(
                token,
                "rest/instruments/detail",
                &[("symbol", symbol.into()), ("marketId", market.into())],
            )
            .await?;
        let detail: InstrumentDetail = serde_json::from_value(take(value, "instrument")?)?;
        Ok(details_table(std::slice::from_ref(&detail))?)
    }

    /// Detailed instruments of one CFI family (see [`cficode`])
    pub async fn instruments_by_cficode(&self, token: &Token, code: &str) -> Result<Table> {
        let details: Vec<InstrumentDetail> = self
            .detailed(token)
            .await?
            .into_iter()
            .filter(|d| d.cficode.as_deref() == Some(code))
            .collect();
        debug!("{} instruments with CFI code {}", details.len(), code);
        Ok(details_table(&details)?)
    }

    // =========================================================================
    // Market data
    // =========================================================================

    /// Snapshot of the requested entries, one row per entry (and per level for books)
    pub async fn market_data(
        &self,
        token: &Token,
        symbol: &str,
        market: &str,
        entries: &[MarketDataEntry],
        depth: u32,
    ) -> Result<Table> {
        let codes: Vec<&str> = entries.iter().map(|e| e.code()).collect();
        let value = self
            .get(
                token,
                "rest/marketdata/get",
                &[
                    ("marketId", market.into()),
                    ("symbol", symbol.into()),
                    ("entries", codes.join(",").into()),
                    ("depth", depth.into()),
                ],
            )
            .await?;
        Ok(market_data_table(&take(value, "marketData")?, entries)?)
    }
}

impl Login for PrimaryClient {
    async fn login(&self) -> Result<Token> {
        self.request_token(Utc::now()).await
    }
}

/// The gateway answers 200 with `{"status": "ERROR", "description": ...}` on failures
fn check_status(value: Value) -> Result<Value> {
    if value.get("status").and_then(Value::as_str) == Some("ERROR") {
        let description = value
            .get("description")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("Primary gateway error: {}", description));
    }
    Ok(value)
}

fn take(value: Value, key: &str) -> crate::error::Result<Value> {
    crate::request::subset(value, key)
}

pub fn details_table(details: &[InstrumentDetail]) -> crate::error::Result<Table> {
    let mut table = Table::new(
        "symbol",
        &[
            "market", "ticker", "desc", "cficode", "currency", "segment", "min_price_increment",
            "contract_multiplier", "low_limit", "high_limit", "maturity_date",
        ],
    );
    for d in details {
        table.push(
            d.instrument_id.symbol.as_str(),
            vec![
                d.instrument_id.market_id.as_str().into(),
                d.ticker().into(),
                d.security_description.clone().into(),
                d.cficode.clone().into(),
                d.currency.clone().into(),
                d.segment.as_ref().map(|s| s.market_segment_id.clone()).into(),
                d.min_price_increment.into(),
                d.contract_multiplier.into(),
                d.low_limit_price.into(),
                d.high_limit_price.into(),
                d.maturity_date.clone().into(),
            ],
        )?;
    }
    Ok(table)
}

/// `{"BI": [{price, size}], "LA": {price, size, date}, "NV": 10, ...}` to rows
pub fn market_data_table(data: &Value, entries: &[MarketDataEntry]) -> crate::error::Result<Table> {
    fn level(entry: &str, value: &Value) -> (Cell, Vec<Cell>) {
        let field = |name: &str| value.get(name).map(Cell::from_json).unwrap_or(Cell::Null);
        let date = value
            .get("date")
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| Cell::DateTime(dt.naive_utc()))
            .unwrap_or(Cell::Null);
        (entry.into(), vec![field("price"), field("size"), date])
    }

    let mut table = Table::new("entry", &["price", "size", "date"]);
    for entry in entries {
        let code = entry.code();
        let rows: Vec<(Cell, Vec<Cell>)> = match data.get(code) {
            None | Some(Value::Null) => vec![(code.into(), vec![Cell::Null, Cell::Null, Cell::Null])],
            Some(Value::Array(levels)) if levels.is_empty() => {
                vec![(code.into(), vec![Cell::Null, Cell::Null, Cell::Null])]
            }
            Some(Value::Array(levels)) => levels.iter().map(|l| level(code, l)).collect(),
            Some(obj @ Value::Object(_)) => vec![level(code, obj)],
            Some(scalar) => vec![(code.into(), vec![Cell::from_json(scalar), Cell::Null, Cell::Null])],
        };
        for (key, values) in rows {
            table.push(key, values)?;
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_market_data_rows() {
        let data = json!({
            "BI": [{"price": 905.5, "size": 10}, {"price": 905.0, "size": 3}],
            "OF": [],
            "LA": {"price": 906.0, "size": 1, "date": 1700000000000_i64},
            "NV": 1250,
            "CL": null
        });
        let entries = [
            MarketDataEntry::Bids,
            MarketDataEntry::Offers,
            MarketDataEntry::Last,
            MarketDataEntry::NominalVolume,
            MarketDataEntry::ClosingPrice,
        ];
        let table = market_data_table(&data, &entries).unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(table.rows[1].values[0], Cell::Float(905.0));
        assert_eq!(table.rows[2].values, vec![Cell::Null, Cell::Null, Cell::Null]);
        assert!(matches!(table.rows[3].values[2], Cell::DateTime(_)));
        assert_eq!(table.get(&Cell::from("NV"), "price"), Some(&Cell::Int(1250)));
    }

    #[test]
    fn test_error_status_is_surfaced() {
        let err = check_status(json!({"status": "ERROR", "description": "Instrument not found"}))
            .unwrap_err();
        assert!(err.to_string().contains("Instrument not found"));
        assert!(check_status(json!({"status": "OK"})).is_ok());
    }
}
