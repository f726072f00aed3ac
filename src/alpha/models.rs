//! Alpha Vantage request parameters and endpoint declarations

use clap::ValueEnum;
use std::fmt;

/// Intraday bar size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Interval {
    #[value(name = "1min")]
    Min1,
    #[value(name = "5min")]
    Min5,
    #[default]
    #[value(name = "15min")]
    Min15,
    #[value(name = "30min")]
    Min30,
    #[value(name = "60min")]
    Min60,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1min",
            Self::Min5 => "5min",
            Self::Min15 => "15min",
            Self::Min30 => "30min",
            Self::Min60 => "60min",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `compact` returns the latest 100 points, `full` the whole history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MovingAverage {
    #[default]
    Sma,
    Ema,
}

impl MovingAverage {
    /// Function name, also the suffix of the response key
    pub fn function(&self) -> &'static str {
        match self {
            Self::Sma => "SMA",
            Self::Ema => "EMA",
        }
    }
}

pub const OHLCV: &[&str] = &["open", "high", "low", "close", "volume"];
pub const OHLC: &[&str] = &["open", "high", "low", "close"];
pub const DAILY_ADJUSTED: &[&str] = &[
    "open", "high", "low", "close", "adj_close", "volume", "div", "split",
];
pub const PERIOD_ADJUSTED: &[&str] = &["open", "high", "low", "close", "adj_close", "volume", "div"];
pub const GLOBAL_QUOTE: &[&str] = &[
    "symbol", "open", "high", "low", "close", "volume", "date", "previous_close", "change",
    "percent_change",
];
pub const EXCHANGE_RATE: &[&str] = &[
    "from_code", "from_name", "to_code", "to_name", "exchange_rate", "last_refresh", "timezone",
    "bid_price", "ask_price",
];

/// One time-series endpoint: its `function`, the key its data sits under,
/// and the names given to the inner fields in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub function: &'static str,
    pub key: String,
    pub columns: &'static [&'static str],
}

impl Series {
    pub fn new(function: &'static str, key: impl Into<String>, columns: &'static [&'static str]) -> Self {
        Self {
            function,
            key: key.into(),
            columns,
        }
    }

    pub fn stock_intraday(interval: Interval) -> Self {
        Self::new("TIME_SERIES_INTRADAY", format!("Time Series ({})", interval), OHLCV)
    }

    pub fn stock_daily() -> Self {
        Self::new("TIME_SERIES_DAILY", "Time Series (Daily)", OHLCV)
    }

    pub fn stock_daily_adjusted() -> Self {
        Self::new("TIME_SERIES_DAILY_ADJUSTED", "Time Series (Daily)", DAILY_ADJUSTED)
    }

    pub fn stock_weekly() -> Self {
        Self::new("TIME_SERIES_WEEKLY", "Weekly Time Series", OHLCV)
    }

    pub fn stock_weekly_adjusted() -> Self {
        Self::new("TIME_SERIES_WEEKLY_ADJUSTED", "Weekly Adjusted Time Series", PERIOD_ADJUSTED)
    }

    pub fn stock_monthly() -> Self {
        Self::new("TIME_SERIES_MONTHLY", "Monthly Time Series", OHLCV)
    }

    pub fn stock_monthly_adjusted() -> Self {
        Self::new("TIME_SERIES_MONTHLY_ADJUSTED", "Monthly Adjusted Time Series", PERIOD_ADJUSTED)
    }

    pub fn fx_intraday(interval: Interval) -> Self {
        Self::new("FX_INTRADAY", format!("Time Series FX ({})", interval), OHLC)
    }

    pub fn fx_daily() -> Self {
        Self::new("FX_DAILY", "Time Series FX (Daily)", OHLC)
    }

    pub fn fx_weekly() -> Self {
        Self::new("FX_WEEKLY", "Time Series FX (Weekly)", OHLC)
    }

    pub fn fx_monthly() -> Self {
        Self::new("FX_MONTHLY", "Time Series FX (Monthly)", OHLC)
    }

    pub fn crypto_intraday(interval: Interval) -> Self {
        Self::new("CRYPTO_INTRADAY", format!("Time Series Crypto ({})", interval), OHLCV)
    }

    pub fn crypto_daily() -> Self {
        Self::new("DIGITAL_CURRENCY_DAILY", "Time Series (Digital Currency Daily)", OHLCV)
    }

    pub fn crypto_weekly() -> Self {
        Self::new("DIGITAL_CURRENCY_WEEKLY", "Time Series (Digital Currency Weekly)", OHLCV)
    }

    pub fn crypto_monthly() -> Self {
        Self::new("DIGITAL_CURRENCY_MONTHLY", "Time Series (Digital Currency Monthly)", OHLCV)
    }

    /// Indicator series keep the provider's field name, lowercased
    pub fn moving_average(kind: MovingAverage) -> Self {
        Self::new(kind.function(), format!("Technical Analysis: {}", kind.function()), &[])
    }
}
