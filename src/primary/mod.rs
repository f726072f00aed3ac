//! Primary (Matba-Rofex) Integration
//!
//! Reference and market data from the futures and options gateway, plus the
//! market-data socket.
//!
//! # Environment Variables
//!
//! - `PRIMARY_USER` - Gateway user
//! - `PRIMARY_PASSWORD` - Gateway password
//! - `PRIMARY_ACCOUNT` (optional) - Trading account
//! - `PRIMARY_LIVE` (optional) - Set to "true" for the live gateway
//!
//! # Tokens
//!
//! Endpoints take a `&Token` (sent as `X-Auth-Token`) and never log in on their own. A token past its
//! expiry is refused before any request is sent, so pass whatever was cached
//! through `fresh_token` first. It returns the same token while it has more
//! than the refresh margin left and logs in once otherwise.
//!
//! # API Endpoints Used
//!
//! - `POST /auth/getToken` - Authentication
//! - `GET /rest/segment/all` - Market segments
//! - `GET /rest/instruments/all` - Instruments
//! - `GET /rest/instruments/details` - Instruments with contract details
//! - `GET /rest/instruments/detail?symbol=...&marketId=...` - One instrument
//! - `GET /rest/marketdata/get?marketId=...&symbol=...&entries=...&depth=...` - Market data
//! - `wss://{host}/` with `X-Auth-Token` - Market data subscriptions (`smd`)

pub mod client;
pub mod models;
pub mod stream;

pub use client::{market_data_table, PrimaryClient};
pub use models::{cficode, BookRow, Environment, MarketDataEntry};
pub use stream::{apply_market_data, smd_message, ws_url, BookBoard, MarketDataListener};
