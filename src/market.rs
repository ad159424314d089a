//! External data-provider and market-calendar interfaces, plus the
//! `BarFeed` cursor the Driver consumes. The concrete providers behind
//! these traits are external collaborators per scope.

use crate::bar::{Bar, IntervalOption, Symbol};
use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Candle/quote retrieval from a third-party market data provider.
#[async_trait::async_trait]
pub trait CandleRetriever: Send + Sync {
    fn set_ticker_symbol(&mut self, symbol: Symbol);
    fn set_interval(&mut self, interval: IntervalOption);
    async fn get_candles(&self) -> Result<Vec<Bar>, EngineError>;
    async fn get_x_candles(&self, n: usize) -> Result<Vec<Bar>, EngineError>;
}

/// Market calendar oracle: session open/close and bar-grid alignment.
pub trait MarketHourOracle: Send + Sync {
    fn is_open_now(&self) -> bool;
    fn exchange_open(&self) -> DateTime<Utc>;
    fn exchange_close(&self) -> DateTime<Utc>;
    /// Timestamp of the most recent bar boundary at or before now.
    fn bar_zero_timestamp(&self) -> i64;
    fn seconds_to_next_bar(&self) -> i64;
    fn bar_gap_seconds(&self) -> i64;
}

/// A rolling window of bars keyed by timestamp, exposing a deque-style
/// cursor where index 0 is the current bar and the remainder are prior
/// bars in reverse chronological order (`bars[0]` = now, last = most
/// distant retained).
#[derive(Debug, Clone, Default)]
pub struct BarFeed {
    bars: VecDeque<Bar>,
    data_delay_seconds: i64,
    first_refresh_last_valid_timestamp: Option<i64>,
}

impl BarFeed {
    pub fn new(data_delay_seconds: i64) -> Self {
        Self {
            bars: VecDeque::new(),
            data_delay_seconds,
            first_refresh_last_valid_timestamp: None,
        }
    }

    /// Load (or replace) the feed from a freshly retrieved batch, oldest
    /// first. Deduplicates by timestamp, so re-loading an identical batch
    /// leaves the frame unchanged.
    pub fn load(&mut self, batch: Vec<Bar>) {
        if self.first_refresh_last_valid_timestamp.is_none() {
            self.first_refresh_last_valid_timestamp = batch.last().map(|b| b.timestamp);
        }
        let mut seen: std::collections::HashSet<i64> = self.bars.iter().map(|b| b.timestamp).collect();
        for bar in batch {
            if seen.insert(bar.timestamp) {
                self.bars.push_front(bar);
            }
        }
    }

    /// Current cursor view: head is the most recent bar, rest trail off in
    /// reverse chronological order.
    pub fn cursor(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    pub fn latest_bar(&self) -> Option<&Bar> {
        self.bars.front()
    }

    /// Largest timestamp aligned to the interval grid; the last bar whose
    /// timestamp is an exact multiple of the interval length, so a
    /// truncated trailing bar (partial candle still forming) is excluded.
    pub fn last_valid_bar(&self, interval: IntervalOption) -> Option<&Bar> {
        self.bars.iter().find(|b| b.timestamp % interval.seconds() == 0)
    }

    pub fn valid_bar_count(&self, interval: IntervalOption) -> usize {
        self.bars.iter().filter(|b| b.timestamp % interval.seconds() == 0).count()
    }

    pub fn data_delay_seconds(&self) -> i64 {
        self.data_delay_seconds
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// A bar counts as "live" if its timestamp is at or after the first
    /// refresh's last-valid timestamp and the market was open when it
    /// arrived — the latter is the caller's responsibility to stamp onto
    /// `Bar::is_live` at ingestion time; this just applies the timestamp
    /// half of the rule.
    pub fn is_live_timestamp(&self, timestamp: i64) -> bool {
        match self.first_refresh_last_valid_timestamp {
            Some(first) => timestamp >= first,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, Utc::now(), close, close, close, close, 100, IntervalOption::OneMinute, Symbol::new("AAPL"), false)
    }

    #[test]
    fn load_is_idempotent_for_identical_batch() {
        let mut feed = BarFeed::new(0);
        let batch = vec![bar(60, 100.0), bar(120, 101.0)];
        feed.load(batch.clone());
        let len_after_first = feed.len();
        feed.load(batch);
        assert_eq!(feed.len(), len_after_first);
    }

    #[test]
    fn cursor_head_is_most_recent() {
        let mut feed = BarFeed::new(0);
        feed.load(vec![bar(60, 100.0), bar(120, 101.0), bar(180, 102.0)]);
        assert_eq!(feed.latest_bar().unwrap().timestamp, 180);
    }
}
