//! HTTP quote endpoint
//!
//! GETs a URL template (`{symbol}` is substituted) and reads the price from a
//! dotted JSON path such as `quote.last` or `data.0.price`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{MarketFeed, Quote};
use crate::error::FeedError;

pub struct HttpQuoteFeed {
    client: reqwest::Client,
    url_template: String,
    price_field: String,
    volume_field: Option<String>,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpQuoteFeed {
    pub fn new(
        url_template: impl Into<String>,
        price_field: impl Into<String>,
        volume_field: Option<String>,
        request_timeout: Duration,
        min_request_interval: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FeedError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            price_field: price_field.into(),
            volume_field: volume_field.filter(|f| !f.is_empty()),
            min_request_interval,
            last_request: Mutex::new(None),
        })
    }

    pub fn url_for(&self, symbol: &str) -> String {
        self.url_template.replace("{symbol}", symbol)
    }

    /// Space requests at least `min_request_interval` apart
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Read a number at a dotted path. Accepts JSON numbers and numeric strings.
pub fn extract_number(value: &Value, path: &str) -> Option<f64> {
    let mut current = value;
    for key in path.split('.').filter(|k| !k.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(key)?,
            _ => return None,
        };
    }
    match current {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl MarketFeed for HttpQuoteFeed {
    async fn get_price(&self, symbol: &str) -> Result<Quote, FeedError> {
        self.throttle().await;

        let url = self.url_for(symbol);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout
            } else {
                FeedError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        let price = extract_number(&body, &self.price_field)
            .ok_or_else(|| FeedError::Parse(format!("missing field '{}'", self.price_field)))?;
        if !(price.is_finite() && price > 0.0) {
            return Err(FeedError::Parse(format!("non-positive price {}", price)));
        }
        let volume = self
            .volume_field
            .as_deref()
            .and_then(|field| extract_number(&body, field));

        Ok(Quote {
            symbol: symbol.to_string(),
            price,
            volume,
            ts: Utc::now().timestamp_millis(),
            stale: false,
        })
    }
}
