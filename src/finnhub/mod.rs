//! Finnhub Integration
//!
//! REST reference data and quotes, plus the live trade stream.
//!
//! # Components
//!
//! - [`client`] - REST client keyed by `token` query parameter
//! - [`stream`] - WebSocket listener feeding a [`QuoteBoard`]
//! - [`models`] - Response types
//!
//! # Environment Variables
//!
//! - `FINNHUB_API_KEY` - API key
//!
//! # API Endpoints Used
//!
//! - `GET /search?q=...` - Symbol lookup
//! - `GET /crypto/exchange` - Crypto exchanges
//! - `GET /quote?symbol=...` - Real-time quote
//! - `wss://ws.finnhub.io?token=...` - Trade stream

pub mod client;
pub mod models;
pub mod stream;

pub use client::{quote_table, FinnhubClient};
pub use models::{BoardRow, Quote, SymbolMatch};
pub use stream::{apply_message, subscribe_message, ListenerState, QuoteBoard, StreamListener};
