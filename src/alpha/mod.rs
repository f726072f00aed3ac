//! Alpha Vantage Integration
//!
//! Stocks, FX and crypto time series, quotes and moving averages.
//!
//! # Environment Variables
//!
//! - `ALPHA_VANTAGE_API_KEY` - API key
//!
//! # Usage
//!
//! ```rust,ignore
//! use apys::alpha::{AlphaClient, OutputSize};
//!
//! let client = AlphaClient::from_env()?;
//! let daily = client.stock_daily("IBM", OutputSize::Compact).await?;
//! println!("{}", daily);
//! ```

pub mod client;
pub mod models;

pub use client::{record_table, series_table, AlphaClient};
pub use models::{Interval, MovingAverage, OutputSize, Series};
