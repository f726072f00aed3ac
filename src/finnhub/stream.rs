//! Finnhub trade stream
//!
//! Keeps a live board of the latest trade per symbol. The listener task
//! writes into the board through its lock; printers read snapshots.

use anyhow::{Context, Result};
use chrono::DateTime;
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::models::{BoardRow, PushMessage};
use crate::table::{Cell, Table};

/// Trade stream endpoint
pub const STREAM_URL: &str = "wss://ws.finnhub.io";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Latest price, volume and trade time per symbol
#[derive(Debug, Default)]
pub struct QuoteBoard {
    rows: RwLock<BTreeMap<String, BoardRow>>,
}

impl QuoteBoard {
    /// Board pre-seeded with zeroed rows for `symbols`
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        let rows = symbols
            .iter()
            .map(|s| (s.as_ref().to_string(), BoardRow::default()))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<BoardRow> {
        self.rows.read().await.get(symbol).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Copy of the board as a symbol-indexed table
    pub async fn snapshot(&self) -> crate::error::Result<Table> {
        let rows = self.rows.read().await;
        let mut table = Table::new("symbol", &["last_price", "datetime", "volume"]);
        for (symbol, row) in rows.iter() {
            let datetime = row
                .datetime
                .map(|dt| Cell::DateTime(dt.naive_utc()))
                .unwrap_or(Cell::Null);
            table.push(
                symbol.as_str(),
                vec![Cell::Float(row.last_price), datetime, Cell::Float(row.volume)],
            )?;
        }
        Ok(table)
    }
}

/// Subscription frame for one ticker
pub fn subscribe_message(symbol: &str) -> String {
    serde_json::json!({"type": "subscribe", "symbol": symbol}).to_string()
}

/// Apply one push message to the board, returning the number of rows written
pub async fn apply_message(board: &QuoteBoard, text: &str) -> Result<usize> {
    let message: PushMessage =
        serde_json::from_str(text).with_context(|| format!("Unparseable push message: {}", text))?;

    if message.data.is_empty() {
        debug!("No trade data in message (type {:?})", message.kind);
        return Ok(0);
    }

    let mut rows = board.rows.write().await;
    for tick in &message.data {
        rows.insert(
            tick.symbol.clone(),
            BoardRow {
                last_price: tick.price,
                volume: tick.volume,
                datetime: DateTime::from_timestamp_millis(tick.timestamp_ms),
            },
        );
    }
    Ok(message.data.len())
}

/// WebSocket consumer for the trade stream. No reconnect: one session per `run`.
pub struct StreamListener {
    url: String,
    symbols: Vec<String>,
    state: watch::Sender<ListenerState>,
}

impl StreamListener {
    pub fn new(api_key: &str, symbols: Vec<String>) -> Self {
        Self::with_url(&format!("{}?token={}", STREAM_URL, api_key), symbols)
    }

    /// Listener against an explicit endpoint URL
    pub fn with_url(url: &str, symbols: Vec<String>) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);
        Self {
            url: url.to_string(),
            symbols,
            state,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        debug!("Listener state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Connect, subscribe every symbol and apply messages until the server
    /// closes the socket, a read fails, or `cancel` turns true.
    pub async fn run(&self, board: &QuoteBoard, mut cancel: watch::Receiver<bool>) -> Result<()> {
        self.set_state(ListenerState::Connecting);
        info!("Connecting to trade stream for {} symbols", self.symbols.len());

        let (ws_stream, _) = match connect_async(self.url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.set_state(ListenerState::Closed);
                return Err(e).context("Failed to connect to trade stream");
            }
        };
        self.set_state(ListenerState::Connected);

        let (mut write, mut read) = ws_stream.split();
        for symbol in &self.symbols {
            write
                .send(Message::Text(subscribe_message(symbol).into()))
                .await
                .with_context(|| format!("Failed to subscribe {}", symbol))?;
        }
        info!("Subscribed to {}", self.symbols.join(", "));

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Cancellation requested, closing trade stream");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = apply_message(board, text.as_str()).await {
                                warn!("{:#}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Trade stream closed by server: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Trade stream read error: {}", e);
                            break;
                        }
                        None => {
                            warn!("Trade stream ended");
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
    use serde_json::Value;

    #[test]
    fn test_subscribe_message() {
        let value: Value = serde_json::from_str(&subscribe_message("BINANCE:BTCUSDT")).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["symbol"], "BINANCE:BTCUSDT");
    }

    #[tokio::test]
    async fn test_apply_trade_message() {
        let board = QuoteBoard::new(&["AAPL", "AMZN"]);
        let updated = apply_message(
            &board,
            r#"{"data":[{"s":"AAPL","p":150.2,"v":100,"t":1700000000000}],"type":"trade"}"#,
        )
        .await
        .unwrap();
        assert_eq!(updated, 1);

        let row = board.get("AAPL").await.unwrap();
        assert_eq!(row.last_price, 150.2);
        assert_eq!(row.volume, 100.0);
        assert_eq!(row.datetime.unwrap().timestamp(), 1_700_000_000);

        let untouched = board.get("AMZN").await.unwrap();
        assert_eq!(untouched, BoardRow::default());
    }

    #[tokio::test]
    async fn test_ping_and_garbage() {
        let board = QuoteBoard::new(&["AAPL"]);
        assert_eq!(apply_message(&board, r#"{"type":"ping"}"#).await.unwrap(), 0);
        assert!(apply_message(&board, "not json").await.is_err());
        assert_eq!(board.get("AAPL").await.unwrap().last_price, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_added() {
        let board = QuoteBoard::new::<&str>(&[]);
        apply_message(&board, r#"{"data":[{"s":"MSFT","p":1.5,"v":2,"t":1700000000500}]}"#)
            .await
            .unwrap();
        assert_eq!(board.len().await, 1);

        let snapshot = board.snapshot().await.unwrap();
        assert_eq!(snapshot.get(&Cell::from("MSFT"), "last_price"), Some(&Cell::Float(1.5)));
    }

    #[test]
    fn test_new_listener_is_disconnected() {
        let listener = StreamListener::new("key", vec!["AAPL".to_string()]);
        assert_eq!(listener.state(), ListenerState::Disconnected);
        assert_eq!(listener.url, "wss://ws.finnhub.io?token=key");
    }
}
