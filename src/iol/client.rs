//! InvertirOnline API Client
//!
//! Bearer-token client for the IOL v2 REST API. Tokens come from a password
//! grant and are passed to each endpoint as a value; [`IolClient::fresh_token`]
//! swaps in a new one when the current one is about to expire.

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::models::*;
use crate::config::ApiConfig;
use crate::request::{ParamValue, Payload, RequestBody, RequestClient};
use crate::table::{parse_date, Cell, Table};
use crate::token::{ensure_fresh, Login, RefreshPolicy, Token};

/// API base URL
pub const BASE_URL: &str = "https://api.invertironline.com";

pub struct IolClient {
    http: RequestClient,
    username: String,
    password: String,
    policy: RefreshPolicy,
}

impl IolClient {
    /// Create a new client from environment variables
    ///
    /// Expects:
    /// - `IOL_USERNAME` - Account username
    /// - `IOL_PASSWORD` - Account password
    pub fn from_env() -> Result<Self> {
        let username =
            std::env::var("IOL_USERNAME").context("IOL_USERNAME environment variable not set")?;
        let password =
            std::env::var("IOL_PASSWORD").context("IOL_PASSWORD environment variable not set")?;
        Self::new(&ApiConfig::new(BASE_URL).with_env_overrides()?, username, password)
    }

    pub fn new(
        config: &ApiConfig,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: RequestClient::new(config)?,
            username: username.into(),
            password: password.into(),
            policy: RefreshPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
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

    async fn request_token(&self) -> Result<Token> {
        info!("Requesting IOL access token for '{}'", self.username);

        let form = vec![
            ("username".to_string(), self.username.clone()),
            ("password".to_string(), self.password.clone()),
            ("grant_type".to_string(), "password".to_string()),
        ];
        let value = self
            .http
            .request(Method::POST, "token", &[], &[], Some(RequestBody::Form(form)))
            .await
            .context("IOL login failed")?
            .into_json()?;

        let response: TokenResponse =
            serde_json::from_value(value).context("Failed to parse IOL token response")?;
        let expires = Token::parse_expiry(&response.expires)?;
        info!("IOL token expires at {}", response.expires);
        Ok(Token::new(response.access_token, expires))
    }

    async fn authed(
        &self,
        token: &Token,
        path: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<Payload> {
        if token.is_expired(Utc::now()) {
            return Err(anyhow!(
                "IOL token expired at {}, pass it through fresh_token before calling {}",
                token.format_expiry(),
                path
            ));
        }
        debug!("IOL GET {}", path);
        let payload = self
            .http
            .get_with_headers(path, &[("Authorization", token.bearer())], params)
            .await
            .with_context(|| format!("IOL request to {} failed", path))?;
        Ok(payload)
    }

    async fn authed_json<T: DeserializeOwned>(&self, token: &Token, path: &str) -> Result<T> {
        let value = self.authed(token, path, &[]).await?.into_json()?;
        serde_json::from_value(value).with_context(|| format!("Unexpected payload from {}", path))
    }

    /// Raw payload of any endpoint path
    pub async fn get_generic(
        &self,
        token: &Token,
        path: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<Payload> {
        self.authed(token, path, params).await
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    /// Daily prices between two dates, oldest first
    pub async fn symbol_daily(
        &self,
        token: &Token,
        symbol: &str,
        market: Market,
        from: NaiveDate,
        to: NaiveDate,
        adjustment: Adjustment,
    ) -> Result<Table> {
        info!("Fetching {} daily from {} to {}", symbol, from, to);
        let path = format!(
            "api/v2/{}/Titulos/{}/Cotizacion/seriehistorica/{}/{}/{}",
            market,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
            adjustment.as_str()
        );
        let quotes: Vec<Cotizacion> = self.authed_json(token, &path).await?;
        Ok(daily_table(symbol, market, &quotes)?)
    }

    /// Latest quote with its order-book levels, one row per level
    pub async fn symbol_last_price(&self, token: &Token, symbol: &str, market: Market) -> Result<Table> {
        let path = format!("api/v2/{}/Titulos/{}/CotizacionDetalleMobile", market, symbol);
        let detail: DetailQuote = self.authed_json(token, &path).await?;
        Ok(last_price_table(&detail)?)
    }

    pub async fn symbol_info(&self, token: &Token, symbol: &str, market: Market) -> Result<Table> {
        let path = format!("api/v2/{}/Titulos/{}", market, symbol);
        let info: SymbolInfo = self.authed_json(token, &path).await?;

        let mut table = Table::new("symbol", &["desc", "country", "market", "type", "term", "currency"]);
        table.push(
            info.symbol,
            vec![
                info.description.into(),
                info.country.into(),
                info.market.into(),
                info.kind.into(),
                info.term.into(),
                info.currency.into(),
            ],
        )?;
        Ok(table)
    }

    /// Option chain of an underlying
    pub async fn symbol_options(&self, token: &Token, symbol: &str, market: Market) -> Result<Table> {
        let path = format!("api/v2/{}/Titulos/{}/Opciones", market, symbol);
        let options: Vec<OptionQuote> = self.authed_json(token, &path).await?;
        debug!("{} options for {}", options.len(), symbol);
        Ok(options_table(&options, Utc::now().date_naive())?)
    }

    // =========================================================================
    // Funds and screens
    // =========================================================================

    /// Mutual funds (FCI), or a single one
    pub async fn fci_info(&self, token: &Token, symbol: Option<&str>) -> Result<Table> {
        let path = match symbol {
            Some(symbol) => format!("api/v2/Titulos/FCI/{}", symbol),
            None => "api/v2/Titulos/FCI".to_string(),
        };
        let records = match self.authed(token, &path, &[]).await?.into_json()? {
            Value::Array(records) => records,
            single => vec![single],
        };
        Ok(Table::from_records(&records, Some(("simbolo", "symbol")), FCI_FIELDS)?)
    }

    /// Instrument classes traded in a country
    pub async fn instruments(&self, token: &Token, country: Country) -> Result<Table> {
        let path = format!("api/v2/{}/Titulos/Cotizacion/Instrumentos", country);
        let instruments: Vec<Instrument> = self.authed_json(token, &path).await?;

        let mut table = Table::new("asset_class", &["country"]);
        for i in instruments {
            let country = i.country.unwrap_or_else(|| country.to_string());
            table.push(i.instrument, vec![country.into()])?;
        }
        Ok(table)
    }

    /// Screens (panels) available for one instrument class
    pub async fn panels(&self, token: &Token, country: Country, instrument: &str) -> Result<Table> {
        let path = format!("api/v2/{}/Titulos/Cotizacion/Paneles/{}", country, instrument);
        let panels: Vec<Panel> = self.authed_json(token, &path).await?;

        let mut table = Table::new("screen", &["country", "asset_class"]);
        for p in panels {
            table.push(p.panel, vec![country.as_str().into(), instrument.into()])?;
        }
        Ok(table)
    }

    /// Last prices of every symbol on a screen
    pub async fn screen_last_price(
        &self,
        token: &Token,
        instrument: &str,
        screen: &str,
        country: Country,
    ) -> Result<Table> {
        let path = format!("api/v2/Cotizaciones/{}/{}/{}", instrument, screen, country);
        let titulos = self.authed(token, &path, &[]).await?.subset("titulos")?;
        let quotes: Vec<ScreenQuote> = serde_json::from_value(titulos)
            .context("Failed to parse screen quotes")?;
        Ok(screen_table(&quotes, country, instrument, screen)?)
    }
}

impl Login for IolClient {
    async fn login(&self) -> Result<Token> {
        self.request_token().await
    }
}

fn num(x: Option<f64>) -> Cell {
    x.into()
}

fn date_time(raw: Option<&str>) -> Cell {
    raw.and_then(|s| parse_date(s.get(..19).unwrap_or(s)))
        .unwrap_or(Cell::Null)
}

/// Historic quotes to a date-indexed table. Intraday duplicates of a date
/// collapse to the row with the largest volume.
pub fn daily_table(
    symbol: &str,
    market: Market,
    quotes: &[Cotizacion],
) -> crate::error::Result<Table> {
    let mut best: BTreeMap<NaiveDate, &Cotizacion> = BTreeMap::new();
    for quote in quotes {
        let Some(date) = quote
            .date_time
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
        else {
            continue;
        };
        let volume = quote.volume.unwrap_or(0.0);
        match best.get(&date) {
            Some(kept) if kept.volume.unwrap_or(0.0) >= volume => {}
            _ => {
                best.insert(date, quote);
            }
        }
    }

    let mut table = Table::new(
        "date",
        &["symbol", "market", "open", "high", "low", "close", "prev_close", "vol", "trades"],
    );
    for (date, q) in best {
        table.push(
            date,
            vec![
                symbol.into(),
                market.as_str().into(),
                num(q.open),
                num(q.high),
                num(q.low),
                num(q.last_price),
                num(q.prev_close),
                num(q.volume),
                num(q.trades),
            ],
        )?;
    }
    Ok(table)
}

pub fn last_price_table(detail: &DetailQuote) -> crate::error::Result<Table> {
    let mut table = Table::new(
        "symbol",
        &[
            "type", "date_time", "open", "high", "low", "close", "bid_q", "bid_price", "ask_price",
            "ask_q", "vol", "desc", "market", "currency", "country", "term", "lote", "lamina_min",
            "q_min", "shown", "buyable", "sellable",
        ],
    );
    let q = &detail.quote;
    let levels = if q.puntas.is_empty() {
        vec![Punta::default()]
    } else {
        q.puntas.clone()
    };
    for level in levels {
        table.push(
            detail.symbol.as_str(),
            vec![
                detail.kind.clone().into(),
                date_time(q.date_time.as_deref()),
                num(q.open),
                num(q.high),
                num(q.low),
                num(q.last_price),
                num(level.bid_q),
                num(level.bid_price),
                num(level.ask_price),
                num(level.ask_q),
                num(q.volume),
                detail.description.clone().into(),
                detail.market.clone().into(),
                detail.currency.as_ref().map(Cell::from_json).unwrap_or(Cell::Null),
                detail.country.clone().into(),
                detail.term.clone().into(),
                num(detail.lote),
                num(detail.lamina_min),
                num(detail.q_min),
                detail.shown.into(),
                detail.buyable.into(),
                detail.sellable.into(),
            ],
        )?;
    }
    Ok(table)
}

/// Strike is the third word of the description (`Call GGAL 170.00 Vencimiento: ...`)
fn strike(description: Option<&str>) -> Option<f64> {
    description?.split_whitespace().nth(2)?.parse().ok()
}

/// Option chain with strike and days to expiry as of `today`
pub fn options_table(options: &[OptionQuote], today: NaiveDate) -> crate::error::Result<Table> {
    let mut table = Table::new(
        "symbol",
        &[
            "date_time", "underlying", "type", "expire", "days_expire", "strike", "open", "high",
            "low", "close", "bid_price", "ask_price", "vol", "var", "desc", "market", "term",
        ],
    );
    for option in options {
        let q = &option.quote;
        let expire = option
            .expire
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok());
        let days_expire: Option<i64> = expire.map(|d| (d - today).num_days());
        let top = q.puntas.first().cloned().unwrap_or_default();

        table.push(
            option.symbol.as_str(),
            vec![
                date_time(q.date_time.as_deref()),
                option.underlying.clone().into(),
                option.kind.clone().into(),
                expire.into(),
                days_expire.into(),
                strike(option.description.as_deref()).into(),
                num(q.open),
                num(q.high),
                num(q.low),
                num(q.last_price),
                num(top.bid_price),
                num(top.ask_price),
                num(q.volume),
                num(q.change),
                option.description.clone().into(),
                option.market.clone().into(),
                option.term.clone().into(),
            ],
        )?;
    }
    Ok(table)
}

/// Screen quotes, one row per symbol
pub fn screen_table(
    quotes: &[ScreenQuote],
    country: Country,
    instrument: &str,
    screen: &str,
) -> crate::error::Result<Table> {
    let mut table = Table::new(
        "symbol",
        &[
            "desc", "open", "high", "low", "close", "prev_close", "var", "bid_q", "bid_price",
            "ask_price", "ask_q", "vol", "date_time", "country", "asset_class", "screen",
        ],
    );
    let mut seen = std::collections::HashSet::new();
    for q in quotes {
        if !seen.insert(q.symbol.as_str()) {
            continue;
        }
        let top = q.puntas.first().cloned().unwrap_or_default();
        table.push(
            q.symbol.as_str(),
            vec![
                q.description.clone().into(),
                num(q.open),
                num(q.high),
                num(q.low),
                num(q.last_price),
                num(q.last_close),
                num(q.pct_change),
                num(top.bid_q),
                num(top.bid_price),
                num(top.ask_price),
                num(top.ask_q),
                num(q.volume),
                date_time(q.date_time.as_deref()),
                country.as_str().into(),
                instrument.into(),
                screen.into(),
            ],
        )?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quote(date_time: &str, close: f64, volume: f64) -> Cotizacion {
        serde_json::from_value(json!({
            "ultimoPrecio": close, "apertura": close, "maximo": close, "minimo": close,
            "cierreAnterior": close - 1.0, "fechaHora": date_time, "volumenNominal": volume,
            "cantidadOperaciones": 42
        }))
        .unwrap()
    }

    #[test]
    fn test_daily_keeps_max_volume_per_date() {
        let quotes = vec![
            quote("2023-02-17T17:00:01.23", 101.0, 5000.0),
            quote("2023-02-17T12:30:00", 100.0, 1200.0),
            quote("2023-02-16T17:00:00", 99.0, 800.0),
        ];
        let table = daily_table("GGAL", Market::Bcba, &quotes).unwrap();

        assert_eq!(table.len(), 2);
        let d17 = Cell::Date(NaiveDate::from_ymd_opt(2023, 2, 17).unwrap());
        assert_eq!(table.get(&d17, "close"), Some(&Cell::Float(101.0)));
        assert_eq!(table.get(&d17, "vol"), Some(&Cell::Float(5000.0)));
        assert_eq!(table.rows[0].key, Cell::Date(NaiveDate::from_ymd_opt(2023, 2, 16).unwrap()));
        assert_eq!(table.get(&d17, "market"), Some(&Cell::from("bCBA")));
        assert_eq!(table.get(&d17, "prev_close"), Some(&Cell::Float(100.0)));
        assert_eq!(table.get(&d17, "trades"), Some(&Cell::Float(42.0)));
    }

    #[test]
    fn test_options_strike_and_days() {
        let options: Vec<OptionQuote> = serde_json::from_value(json!([{
            "cotizacion": {"ultimoPrecio": 109.5, "fechaHora": "0001-01-01T00:00:00", "puntas": null},
            "simboloSubyacente": "GGAL",
            "fechaVencimiento": "2023-02-17T00:00:00",
            "tipoOpcion": "Call",
            "simbolo": "GFGC170.FE",
            "descripcion": "Call GGAL 170.00 Vencimiento: 17/02/2023",
            "mercado": "bcba",
            "plazo": "t1"
        }]))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2023, 2, 7).unwrap();
        let table = options_table(&options, today).unwrap();

        let key = Cell::from("GFGC170.FE");
        assert_eq!(table.get(&key, "strike"), Some(&Cell::Float(170.0)));
        assert_eq!(table.get(&key, "days_expire"), Some(&Cell::Int(10)));
        assert_eq!(table.get(&key, "underlying"), Some(&Cell::from("GGAL")));
        assert_eq!(table.get(&key, "market"), Some(&Cell::from("bcba")));
        assert_eq!(table.get(&key, "term"), Some(&Cell::from("t1")));
    }

    #[test]
    fn test_screen_dedups_symbols() {
        let quotes: Vec<ScreenQuote> = serde_json::from_value(json!([
            {"simbolo": "AL30", "ultimoPrecio": 10.0, "ultimoCierre": 9.5, "variacionPorcentual": 5.26,
             "puntas": {"precioCompra": 9.9, "precioVenta": 10.1}, "fecha": "2023-02-17T17:00:00"},
            {"simbolo": "AL30", "ultimoPrecio": 11.0, "puntas": null},
            {"simbolo": "GD30", "ultimoPrecio": 12.0, "puntas": null}
        ]))
        .unwrap();
        let table = screen_table(&quotes, Country::Argentina, "titulosPublicos", "todos").unwrap();

        assert_eq!(table.len(), 2);
        let al30 = Cell::from("AL30");
        assert_eq!(table.get(&al30, "close"), Some(&Cell::Float(10.0)));
        assert_eq!(table.get(&al30, "bid_price"), Some(&Cell::Float(9.9)));
        assert_eq!(table.get(&al30, "screen"), Some(&Cell::from("todos")));
        assert_eq!(table.get(&al30, "prev_close"), Some(&Cell::Float(9.5)));
        assert_eq!(table.get(&al30, "var"), Some(&Cell::Float(5.26)));
    }

    #[test]
    fn test_last_price_one_row_per_level() {
        let detail: DetailQuote = serde_json::from_value(json!({
            "simbolo": "GGAL", "ultimoPrecio": 152.6, "fechaHora": "2023-02-17T17:00:01.23",
            "puntas": [
                {"cantidadCompra": 3.0, "precioCompra": 152.5, "precioVenta": 152.75, "cantidadVenta": 5545.0},
                {"cantidadCompra": 10.0, "precioCompra": 152.0, "precioVenta": 153.0, "cantidadVenta": 20.0}
            ]
        }))
        .unwrap();
        let table = last_price_table(&detail).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1].values[table.column_index("bid_price").unwrap()], Cell::Float(152.0));
        assert!(matches!(
            table.rows[0].values[table.column_index("date_time").unwrap()],
            Cell::DateTime(_)
        ));
    }
}
