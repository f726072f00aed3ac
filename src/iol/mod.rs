//! InvertirOnline (IOL) Integration
//!
//! Brokerage REST API for the Argentine and US markets.
//!
//! # Environment Variables
//!
//! - `IOL_USERNAME` - Account username
//! - `IOL_PASSWORD` - Account password
//!
//! # Usage
//!
//! ```rust,ignore
//! use apys::iol::{IolClient, Market};
//!
//! let client = IolClient::from_env()?;
//! let token = client.fresh_token(cached).await?;
//! let info = client.symbol_info(&token, "GGAL", Market::Bcba).await?;
//! ```
//!
//! # Tokens
//!
//! Endpoints take a `&Token` and never log in on their own. A token past its
//! expiry is refused before any request is sent, so pass whatever was cached
//! through `fresh_token` first. It returns the same token while it has more
//! than the refresh margin left and logs in once otherwise.
//!
//! # API Endpoints Used
//!
//! - `POST /token` - Password grant
//! - `GET /api/v2/{market}/Titulos/{symbol}` - Symbol info
//! - `GET /api/v2/{market}/Titulos/{symbol}/CotizacionDetalleMobile` - Last price
//! - `GET /api/v2/{market}/Titulos/{symbol}/Cotizacion/seriehistorica/...` - Daily series
//! - `GET /api/v2/{market}/Titulos/{symbol}/Opciones` - Option chain
//! - `GET /api/v2/Titulos/FCI[/{symbol}]` - Mutual funds
//! - `GET /api/v2/{country}/Titulos/Cotizacion/Instrumentos` - Instrument classes
//! - `GET /api/v2/{country}/Titulos/Cotizacion/Paneles/{instrument}` - Screens
//! - `GET /api/v2/Cotizaciones/{instrument}/{screen}/{country}` - Screen quotes

pub mod client;
pub mod models;

pub use client::{daily_table, options_table, IolClient};
pub use models::{Adjustment, Country, Market};
