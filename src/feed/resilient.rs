//! Retry, fallback and last-known-good wrapper around other feeds

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::{MarketFeed, Quote};
use crate::error::FeedError;

const BACKOFF_JITTER_RATIO: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per endpoint after the first failure
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff (capped) + jitter up to 20%
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        let jitter_cap = ((base as f64) * BACKOFF_JITTER_RATIO).round() as u64;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Longest backoff `backoff(attempt)` can return
    fn max_backoff_ms(&self, attempt: u32) -> u64 {
        let base = self
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        base.saturating_add(((base as f64) * BACKOFF_JITTER_RATIO).round() as u64)
    }

    /// Worst case for one endpoint: every attempt runs into the request
    /// timeout, with the longest jittered backoff between attempts.
    pub fn endpoint_budget_ms(&self, request_timeout_ms: u64) -> u64 {
        let attempts = u64::from(self.max_retries) + 1;
        let backoffs: u64 = (0..self.max_retries).map(|a| self.max_backoff_ms(a)).sum();
        attempts.saturating_mul(request_timeout_ms).saturating_add(backoffs)
    }
}

pub struct ResilientFeed {
    endpoints: Vec<Arc<dyn MarketFeed>>,
    policy: RetryPolicy,
    max_stale_ms: i64,
    last_good: Mutex<HashMap<String, Quote>>,
}

impl ResilientFeed {
    pub fn new(endpoints: Vec<Arc<dyn MarketFeed>>, policy: RetryPolicy, max_stale_ms: i64) -> Self {
        Self {
            endpoints,
            policy,
            max_stale_ms,
            last_good: Mutex::new(HashMap::new()),
        }
    }

    fn remember(&self, quote: &Quote) {
        if let Ok(mut cache) = self.last_good.lock() {
            cache.insert(quote.symbol.clone(), quote.clone());
        }
    }

    fn cached(&self, symbol: &str, now: i64) -> Option<Quote> {
        let cache = self.last_good.lock().ok()?;
        let quote = cache.get(symbol)?;
        if now - quote.ts > self.max_stale_ms {
            return None;
        }
        Some(Quote {
            stale: true,
            ..quote.clone()
        })
    }
}

#[async_trait]
impl MarketFeed for ResilientFeed {
    async fn get_price(&self, symbol: &str) -> Result<Quote, FeedError> {
        let mut last_error = FeedError::NoData;

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            for attempt in 0..=self.policy.max_retries {
                match endpoint.get_price(symbol).await {
                    Ok(quote) => {
                        self.remember(&quote);
                        return Ok(quote);
                    }
                    Err(e) => {
                        debug!(
                            symbol = %symbol,
                            endpoint = idx,
                            attempt = attempt + 1,
                            error = %e,
                            "Quote fetch failed"
                        );
                        last_error = e;
                        if attempt < self.policy.max_retries {
                            tokio::time::sleep(self.policy.backoff(attempt)).await;
                        }
                    }
                }
            }
            if idx + 1 < self.endpoints.len() {
                warn!(symbol = %symbol, endpoint = idx, "Endpoint exhausted, falling back");
            }
        }

        if let Some(quote) = self.cached(symbol, Utc::now().timestamp_millis()) {
            warn!(symbol = %symbol, age_ms = Utc::now().timestamp_millis() - quote.ts, "Serving stale quote");
            return Ok(quote);
        }
        Err(FeedError::Exhausted(last_error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockMarketFeed;

    fn no_backoff() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    #[test]
    fn backoff_is_capped_with_bounded_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        for attempt in 0..10 {
            let d = policy.backoff(attempt).as_millis() as u64;
            let base = (100u64 << attempt).min(1_000);
            assert!(d >= base && d <= base + base / 5 + 1, "attempt {attempt}: {d}");
        }
    }

    /// Sleeps for the request timeout, then fails like a hung connection
    struct HangingFeed {
        timeout: Duration,
    }

    #[async_trait]
    impl MarketFeed for HangingFeed {
        async fn get_price(&self, _symbol: &str) -> Result<Quote, FeedError> {
            tokio::time::sleep(self.timeout).await;
            Err(FeedError::Timeout)
        }
    }

    #[test]
    fn endpoint_budget_counts_attempts_and_backoffs() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
        };
        // 3 × 3000 + (250 + 50) + (500 + 100)
        assert_eq!(policy.endpoint_budget_ms(3_000), 9_900);
        assert_eq!(no_backoff().endpoint_budget_ms(40), 80);
    }

    #[tokio::test]
    async fn hung_primary_still_reaches_fallback_within_budget() {
        let request_timeout_ms = 40;
        let policy = no_backoff();
        let mut secondary = MockMarketFeed::new();
        let now = Utc::now().timestamp_millis();
        secondary
            .expect_get_price()
            .times(1)
            .returning(move |s| Ok(Quote::new(s, 7.5, now)));
        let hanging = HangingFeed {
            timeout: Duration::from_millis(request_timeout_ms),
        };
        let feed = ResilientFeed::new(vec![Arc::new(hanging), Arc::new(secondary)], policy.clone(), 60_000);

        // Same shape as the engine's per-fetch deadline: one budget per endpoint
        let deadline = Duration::from_millis(2 * policy.endpoint_budget_ms(request_timeout_ms) + 200);
        let quote = tokio::time::timeout(deadline, feed.get_price("SOXL"))
            .await
            .expect("fallback reached before the deadline")
            .unwrap();
        assert_eq!(quote.price, 7.5);
    }

    #[tokio::test]
    async fn falls_back_to_second_endpoint() {
        let mut primary = MockMarketFeed::new();
        primary
            .expect_get_price()
            .times(2)
            .returning(|_| Err(FeedError::Status(503)));
        let mut secondary = MockMarketFeed::new();
        let now = Utc::now().timestamp_millis();
        secondary
            .expect_get_price()
            .times(1)
            .returning(move |s| Ok(Quote::new(s, 42.0, now)));

        let feed = ResilientFeed::new(vec![Arc::new(primary), Arc::new(secondary)], no_backoff(), 60_000);
        let quote = feed.get_price("SOXL").await.unwrap();
        assert_eq!(quote.price, 42.0);
        assert!(!quote.stale);
    }

    #[tokio::test]
    async fn serves_stale_quote_then_exhausts() {
        let now = Utc::now().timestamp_millis();
        let mut calls = 0;
        let mut endpoint = MockMarketFeed::new();
        endpoint.expect_get_price().returning(move |s| {
            calls += 1;
            if calls == 1 {
                Ok(Quote::new(s, 10.0, now))
            } else {
                Err(FeedError::Timeout)
            }
        });

        let feed = ResilientFeed::new(vec![Arc::new(endpoint)], no_backoff(), 60_000);
        assert!(!feed.get_price("ETH").await.unwrap().stale);
        let stale = feed.get_price("ETH").await.unwrap();
        assert!(stale.stale);
        assert!(!stale.is_tradeable());

        // Unknown symbol has no cache entry
        let err = feed.get_price("BTC").await.unwrap_err();
        assert!(matches!(err, FeedError::Exhausted(_)));
    }
}
