//! Market-data boundary
//!
//! The engine only ever talks to [`MarketFeed`]. Adapters:
//! - [`HttpQuoteFeed`]: REST quote endpoint with a JSON price field
//! - [`ResilientFeed`]: retries, endpoint fallback and last-known-good cache
//! - [`ReplayFeed`]: CSV playback for offline simulation

mod http;
mod replay;
mod resilient;

pub use http::{extract_number, HttpQuoteFeed};
pub use replay::ReplayFeed;
pub use resilient::{ResilientFeed, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::FeedError;
use crate::types::{Bar, Timeframe, TimestampMs};

/// Latest observation for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub volume: Option<f64>,
    pub ts: TimestampMs,
    /// Served from the last-known-good cache after every endpoint failed
    #[serde(default)]
    pub stale: bool,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: f64, ts: TimestampMs) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume: None,
            ts,
            stale: false,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Usable for trading decisions
    pub fn is_tradeable(&self) -> bool {
        !self.stale && self.price.is_finite() && self.price > 0.0
    }

    pub fn to_bar(&self) -> Bar {
        Bar {
            ts: self.ts,
            price: self.price,
            volume: self.volume,
        }
    }
}

/// Trait for price sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Latest price for `symbol`
    async fn get_price(&self, symbol: &str) -> Result<Quote, FeedError>;
}

/// Rolling price windows keyed by (symbol, timeframe)
#[derive(Debug, Clone, Default)]
pub struct PriceWindows {
    capacity: usize,
    windows: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl PriceWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            windows: HashMap::new(),
        }
    }

    /// Append a bar. A bar with the same timestamp as the last one replaces
    /// it, so a key advances at most once per tick.
    pub fn push(&mut self, symbol: &str, timeframe: Timeframe, bar: Bar) {
        let window = self
            .windows
            .entry((symbol.to_string(), timeframe))
            .or_default();
        match window.last_mut() {
            Some(last) if last.ts == bar.ts => *last = bar,
            _ => window.push(bar),
        }
        // Trim lazily to keep pushes amortized O(1)
        if window.len() >= self.capacity * 2 {
            let excess = window.len() - self.capacity;
            window.drain(..excess);
        }
    }

    /// Append a bar unless the key already took one within the current
    /// timeframe period. Returns whether the window moved.
    pub fn advance(&mut self, symbol: &str, timeframe: Timeframe, bar: Bar) -> bool {
        let period = timeframe.interval_ms();
        let in_period = self
            .window(symbol, timeframe)
            .last()
            .map(|last| last.ts != bar.ts && bar.ts - last.ts < period)
            .unwrap_or(false);
        if in_period {
            return false;
        }
        self.push(symbol, timeframe, bar);
        true
    }

    /// Up to `capacity` most recent bars, oldest first
    pub fn window(&self, symbol: &str, timeframe: Timeframe) -> &[Bar] {
        match self.windows.get(&(symbol.to_string(), timeframe)) {
            Some(w) => &w[w.len().saturating_sub(self.capacity)..],
            None => &[],
        }
    }

    pub fn last_price(&self, symbol: &str, timeframe: Timeframe) -> Option<f64> {
        self.window(symbol, timeframe).last().map(|b| b.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, price: f64) -> Bar {
        Bar {
            ts,
            price,
            volume: None,
        }
    }

    #[test]
    fn window_keeps_most_recent_capacity() {
        let mut w = PriceWindows::new(3);
        for i in 0..10 {
            w.push("X", Timeframe(1), bar(i, i as f64));
        }
        let prices: Vec<f64> = w.window("X", Timeframe(1)).iter().map(|b| b.price).collect();
        assert_eq!(prices, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn same_timestamp_replaces() {
        let mut w = PriceWindows::new(5);
        w.push("X", Timeframe(1), bar(1, 100.0));
        w.push("X", Timeframe(1), bar(1, 101.0));
        assert_eq!(w.window("X", Timeframe(1)).len(), 1);
        assert_eq!(w.last_price("X", Timeframe(1)), Some(101.0));
    }

    #[test]
    fn advance_takes_one_bar_per_period() {
        let mut w = PriceWindows::new(10);
        let tf = Timeframe(5);
        assert!(w.advance("X", tf, bar(0, 100.0)));
        // A late straggler one minute in must not add a second 5m bar
        assert!(!w.advance("X", tf, bar(60_000, 101.0)));
        assert!(w.advance("X", tf, bar(300_000, 102.0)));
        let ts: Vec<i64> = w.window("X", tf).iter().map(|b| b.ts).collect();
        assert_eq!(ts, vec![0, 300_000]);
    }

    #[test]
    fn keys_are_independent() {
        let mut w = PriceWindows::new(5);
        w.push("X", Timeframe(1), bar(1, 100.0));
        assert!(w.window("X", Timeframe(5)).is_empty());
        assert!(w.window("Y", Timeframe(1)).is_empty());
    }

    #[test]
    fn stale_quotes_are_not_tradeable() {
        let mut q = Quote::new("X", 10.0, 1);
        assert!(q.is_tradeable());
        q.stale = true;
        assert!(!q.is_tradeable());
    }
}
