//! The immutable OHLCV candle type the rest of the engine is driven by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticker symbol, newtype-wrapped to avoid mixing up with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Supported candle intervals, carrying both the wire code and its length
/// in seconds (used to compute bar-grid alignment and `seconds_to_next_bar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalOption {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl IntervalOption {
    pub const ALL: [IntervalOption; 8] = [
        IntervalOption::OneMinute,
        IntervalOption::TwoMinutes,
        IntervalOption::FiveMinutes,
        IntervalOption::FifteenMinutes,
        IntervalOption::ThirtyMinutes,
        IntervalOption::OneHour,
        IntervalOption::FourHours,
        IntervalOption::OneDay,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            IntervalOption::OneMinute => "1m",
            IntervalOption::TwoMinutes => "2m",
            IntervalOption::FiveMinutes => "5m",
            IntervalOption::FifteenMinutes => "15m",
            IntervalOption::ThirtyMinutes => "30m",
            IntervalOption::OneHour => "1h",
            IntervalOption::FourHours => "4h",
            IntervalOption::OneDay => "1d",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            IntervalOption::OneMinute => 60,
            IntervalOption::TwoMinutes => 120,
            IntervalOption::FiveMinutes => 300,
            IntervalOption::FifteenMinutes => 900,
            IntervalOption::ThirtyMinutes => 1_800,
            IntervalOption::OneHour => 3_600,
            IntervalOption::FourHours => 14_400,
            IntervalOption::OneDay => 86_400,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.code() == code)
    }
}

/// One OHLCV candle. Immutable once ingested by a `BarFeed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub interval_code: &'static str,
    pub symbol: Symbol,
    /// True if this bar was produced by a live refresh during the session,
    /// as opposed to the initial historical load.
    pub is_live: bool,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: i64,
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        interval: IntervalOption,
        symbol: Symbol,
        is_live: bool,
    ) -> Self {
        Self {
            timestamp,
            datetime,
            open,
            high,
            low,
            close,
            volume,
            interval_code: interval.code(),
            symbol,
            is_live,
        }
    }
}
