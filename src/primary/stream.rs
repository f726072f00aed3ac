//! Primary market-data socket
//!
//! Subscribes a list of instruments with one `smd` frame and keeps the top
//! of book, last trade and volumes of each in a [`BookBoard`]. The gateway
//! authenticates the upgrade request with the same `X-Auth-Token` the REST
//! endpoints use.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::models::{BookRow, Environment, MarketDataEntry, PriceLevel, StreamMessage};
use crate::finnhub::ListenerState;
use crate::table::{Cell, Table};
use crate::token::Token;

/// Entries subscribed when none are given
pub const DEFAULT_ENTRIES: [MarketDataEntry; 5] = [
    MarketDataEntry::Bids,
    MarketDataEntry::Offers,
    MarketDataEntry::Last,
    MarketDataEntry::NominalVolume,
    MarketDataEntry::TradeEffectiveVolume,
];

/// `https://host` -> `wss://host/`
pub fn ws_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}/", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}/", rest)
    } else {
        format!("{}/", base)
    }
}

/// Book, last trade and volumes per instrument symbol
#[derive(Debug, Default)]
pub struct BookBoard {
    rows: RwLock<BTreeMap<String, BookRow>>,
}

impl BookBoard {
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        let rows = symbols
            .iter()
            .map(|s| (s.as_ref().to_string(), BookRow::default()))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<BookRow> {
        self.rows.read().await.get(symbol).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn snapshot(&self) -> crate::error::Result<Table> {
        let rows = self.rows.read().await;
        let mut table = Table::new(
            "symbol",
            &[
                "bid_size", "bid", "offer", "offer_size", "last", "last_size", "nominal_volume",
                "effective_volume", "datetime",
            ],
        );
        for (symbol, row) in rows.iter() {
            table.push(
                symbol.as_str(),
                vec![
                    row.bid_size.into(),
                    row.bid.into(),
                    row.offer.into(),
                    row.offer_size.into(),
                    row.last.into(),
                    row.last_size.into(),
                    row.nominal_volume.into(),
                    row.effective_volume.into(),
                    row.datetime
                        .map(|dt| Cell::DateTime(dt.naive_utc()))
                        .unwrap_or(Cell::Null),
                ],
            )?;
        }
        Ok(table)
    }
}

/// `smd` subscription frame for every symbol on one market
pub fn smd_message<S: AsRef<str>>(
    symbols: &[S],
    market: &str,
    entries: &[MarketDataEntry],
    depth: u32,
) -> String {
    let products: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| serde_json::json!({"symbol": s.as_ref(), "marketId": market}))
        .collect();
    let codes: Vec<&str> = entries.iter().map(|e| e.code()).collect();
    serde_json::json!({
        "type": "smd",
        "level": 1,
        "entries": codes,
        "products": products,
        "depth": depth,
    })
    .to_string()
}

/// Apply one socket frame, returning the number of rows written (0 or 1)
///
/// Book sides are replaced on every `Md` frame; last trade and volumes keep
/// their previous value when the frame omits them.
pub async fn apply_market_data(board: &BookBoard, text: &str) -> Result<usize> {
    let message: StreamMessage =
        serde_json::from_str(text).with_context(|| format!("Unparseable market data frame: {}", text))?;

    if message.status.as_deref() == Some("ERROR") {
        return Err(anyhow!(
            "Primary socket error: {}",
            message.description.as_deref().unwrap_or("unknown error")
        ));
    }
    if message.kind.as_deref() != Some("Md") {
        debug!("Ignoring frame of type {:?}", message.kind);
        return Ok(0);
    }
    let (Some(instrument), Some(data)) = (message.instrument_id, message.market_data) else {
        return Err(anyhow!("Md frame without instrumentId or marketData: {}", text));
    };

    let top = |levels: &[PriceLevel]| levels.first().cloned().unwrap_or_default();
    let bid = top(&data.bids);
    let offer = top(&data.offers);

    let mut rows = board.rows.write().await;
    let row = rows.entry(instrument.symbol).or_default();
    row.bid = bid.price;
    row.bid_size = bid.size;
    row.offer = offer.price;
    row.offer_size = offer.size;
    if let Some(last) = data.last {
        row.last = last.price;
        row.last_size = last.size;
        row.datetime = last
            .date
            .or(message.timestamp)
            .and_then(DateTime::<Utc>::from_timestamp_millis);
    }
    if data.nominal_volume.is_some() {
        row.nominal_volume = data.nominal_volume;
    }
    if data.effective_volume.is_some() {
        row.effective_volume = data.effective_volume;
    }
    Ok(1)
}

/// WebSocket consumer for the gateway's market data. One session per `run`.
pub struct MarketDataListener {
    url: String,
    token: Token,
    symbols: Vec<String>,
    market: String,
    entries: Vec<MarketDataEntry>,
    depth: u32,
    state: watch::Sender<ListenerState>,
}

impl MarketDataListener {
    pub fn new(environment: Environment, token: Token, symbols: Vec<String>) -> Self {
        Self::with_url(&ws_url(environment.base_url()), token, symbols)
    }

    /// Listener against an explicit socket URL
    pub fn with_url(url: &str, token: Token, symbols: Vec<String>) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            url: url.to_string(),
            token,
            symbols,
            market: "ROFX".to_string(),
            entries: DEFAULT_ENTRIES.to_vec(),
            depth: 1,
            state,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    pub fn with_entries(mut self, entries: Vec<MarketDataEntry>, depth: u32) -> Self {
        self.entries = entries;
        self.depth = depth;
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        debug!("Market data listener state -> {:?}", state);
        self.state.send_replace(state);
    }

    async fn connect(
        &self,
    ) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>>
    {
        if self.token.is_expired(Utc::now()) {
            return Err(anyhow!(
                "Primary token expired at {}, pass it through fresh_token first",
                self.token.format_expiry()
            ));
        }
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .context("Invalid market data URL")?;
        let token = HeaderValue::from_str(&self.token.access_token)
            .context("Token is not a valid header value")?;
        request.headers_mut().insert("X-Auth-Token", token);

        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to Primary market data socket")?;
        Ok(ws_stream)
    }

    /// Connect, send the subscription and apply frames until the server
    /// closes the socket, a read fails, or `cancel` turns true.
    pub async fn run(&self, board: &BookBoard, mut cancel: watch::Receiver<bool>) -> Result<()> {
        self.set_state(ListenerState::Connecting);
        info!("Connecting to Primary market data for {} symbols", self.symbols.len());

        let ws_stream = match self.connect().await {
            Ok(ws) => ws,
            Err(e) => {
                self.set_state(ListenerState::Closed);
                return Err(e);
            }
        };
        self.set_state(ListenerState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let subscription = smd_message(&self.symbols, &self.market, &self.entries, self.depth);
        write
            .send(Message::Text(subscription.into()))
            .await
            .context("Failed to send market data subscription")?;
        info!("Subscribed to {} on {}", self.symbols.join(", "), self.market);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Cancellation requested, closing market data socket");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = apply_market_data(board, text.as_str()).await {
                                warn!("{:#}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Market data socket closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Market data read error: {}", e);
                            break;
                        }
                        None => {
                            warn!("Market data socket ended");
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(ListenerState::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Value;

    const MD: &str = r#"{"type":"Md","timestamp":1700000000500,
        "instrumentId":{"marketId":"ROFX","symbol":"DLR/DIC23"},
        "marketData":{"BI":[{"price":905.5,"size":10},{"price":905.0,"size":3}],
                      "OF":[{"price":906.0,"size":4}],
                      "LA":{"price":905.8,"size":2,"date":1700000000000},
                      "NV":1250,"EV":"1132.5"}}"#;

    #[test]
    fn test_ws_url() {
        assert_eq!(ws_url("https://api.remarkets.primary.com.ar"), "wss://api.remarkets.primary.com.ar/");
        assert_eq!(ws_url("http://127.0.0.1:9000/"), "ws://127.0.0.1:9000/");
    }

    #[test]
    fn test_smd_message() {
        let text = smd_message(&["DLR/DIC23", "DLR/ENE24"], "ROFX", &DEFAULT_ENTRIES, 1);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "smd");
        assert_eq!(value["level"], 1);
        assert_eq!(value["depth"], 1);
        assert_eq!(value["entries"], serde_json::json!(["BI", "OF", "LA", "NV", "EV"]));
        assert_eq!(value["products"][1]["symbol"], "DLR/ENE24");
        assert_eq!(value["products"][1]["marketId"], "ROFX");
    }

    #[tokio::test]
    async fn test_apply_md_frame() {
        let board = BookBoard::new(&["DLR/DIC23"]);
        assert_eq!(apply_market_data(&board, MD).await.unwrap(), 1);

        let row = board.get("DLR/DIC23").await.unwrap();
        assert_eq!(row.bid, Some(905.5));
        assert_eq!(row.bid_size, Some(10.0));
        assert_eq!(row.offer, Some(906.0));
        assert_eq!(row.last, Some(905.8));
        assert_eq!(row.nominal_volume, Some(1250.0));
        assert_eq!(row.effective_volume, Some(1132.5));
        assert_eq!(row.datetime.unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_partial_frame_keeps_last_trade() {
        let board = BookBoard::new(&["DLR/DIC23"]);
        apply_market_data(&board, MD).await.unwrap();
        apply_market_data(
            &board,
            r#"{"type":"Md","instrumentId":{"marketId":"ROFX","symbol":"DLR/DIC23"},
                "marketData":{"BI":[],"OF":null,"LA":null}}"#,
        )
        .await
        .unwrap();

        let row = board.get("DLR/DIC23").await.unwrap();
        assert_eq!(row.bid, None);
        assert_eq!(row.offer, None);
        assert_eq!(row.last, Some(905.8));
        assert_eq!(row.nominal_volume, Some(1250.0));
    }

    #[tokio::test]
    async fn test_error_and_other_frames() {
        let board = BookBoard::new(&["DLR/DIC23"]);
        let err = apply_market_data(&board, r#"{"status":"ERROR","description":"Invalid instrument"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid instrument"));
        assert_eq!(apply_market_data(&board, r#"{"type":"or"}"#).await.unwrap(), 0);
        assert!(apply_market_data(&board, "not json").await.is_err());
        assert_eq!(board.get("DLR/DIC23").await, Some(BookRow::default()));
    }

    #[tokio::test]
    async fn test_snapshot_columns() {
        let board = BookBoard::new::<&str>(&[]);
        apply_market_data(&board, MD).await.unwrap();
        assert_eq!(board.len().await, 1);

        let table = board.snapshot().await.unwrap();
        let key = Cell::from("DLR/DIC23");
        assert_eq!(table.get(&key, "bid"), Some(&Cell::Float(905.5)));
        assert_eq!(table.get(&key, "offer_size"), Some(&Cell::Float(4.0)));
        assert_eq!(table.get(&key, "last_size"), Some(&Cell::Float(2.0)));
    }

    #[tokio::test]
    async fn test_expired_token_never_connects() {
        let stale = Token::new("old", Utc::now() - Duration::minutes(1));
        let listener = MarketDataListener::with_url("ws://127.0.0.1:1/", stale, vec!["DLR/DIC23".into()]);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let err = listener.run(&BookBoard::default(), cancel_rx).await.unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert_eq!(listener.state(), ListenerState::Closed);
    }

    #[test]
    fn test_new_listener_targets_environment() {
        let token = Token::new("t", Utc::now() + Duration::hours(1));
        let listener = MarketDataListener::new(Environment::Remarkets, token, vec![]);
        assert_eq!(listener.url, "wss://api.remarkets.primary.com.ar/");
        assert_eq!(listener.state(), ListenerState::Disconnected);
    }
}
