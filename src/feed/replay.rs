//! CSV replay feed
//!
//! Rows are `timestamp,symbol,price,volume` (volume may be empty). Each
//! `get_price` call consumes the next row for that symbol.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use super::{MarketFeed, Quote};
use crate::error::{FeedError, FleetError};

#[derive(Debug, Deserialize)]
struct ReplayRow {
    timestamp: i64,
    symbol: String,
    price: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ReplayFeed {
    queues: Mutex<HashMap<String, VecDeque<Quote>>>,
}

impl ReplayFeed {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FleetError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut queues: HashMap<String, VecDeque<Quote>> = HashMap::new();
        for row in rdr.deserialize() {
            let row: ReplayRow = row?;
            let symbol = row.symbol.to_uppercase();
            queues.entry(symbol.clone()).or_default().push_back(Quote {
                symbol,
                price: row.price,
                volume: row.volume,
                ts: row.timestamp,
                stale: false,
            });
        }
        Ok(Self {
            queues: Mutex::new(queues),
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.queues
            .lock()
            .map(|q| q.values().all(VecDeque::is_empty))
            .unwrap_or(true)
    }

    /// Earliest pending timestamp across all symbols
    pub fn first_timestamp(&self) -> Option<i64> {
        let queues = self.queues.lock().ok()?;
        queues.values().filter_map(|q| q.front().map(|r| r.ts)).min()
    }

    pub fn remaining(&self, symbol: &str) -> usize {
        self.queues
            .lock()
            .ok()
            .and_then(|q| q.get(symbol).map(VecDeque::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn get_price(&self, symbol: &str) -> Result<Quote, FeedError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| FeedError::Http(format!("replay queue poisoned: {}", e)))?;
        queues
            .get_mut(symbol)
            .and_then(VecDeque::pop_front)
            .ok_or(FeedError::NoData)
    }
}
