//! Error types for the fleet and its feed boundary

use thiserror::Error;

/// Fleet-level errors
#[derive(Debug, Error)]
pub enum FleetError {
    /// Transient: the price for a symbol could not be read this tick
    #[error("feed unavailable for {symbol}: {reason}")]
    FeedUnavailable { symbol: String, reason: String },

    /// Fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Benign: not enough samples yet
    #[error("insufficient data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// Informational: convergence deferred
    #[error("allocation skipped: {0}")]
    AllocationSkipped(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl FleetError {
    pub fn config(msg: impl Into<String>) -> Self {
        FleetError::Configuration(msg.into())
    }

    /// Only configuration errors abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, FleetError::Configuration(_))
    }
}

/// Errors at the market-data boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("request timed out")]
    Timeout,
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("could not parse quote: {0}")]
    Parse(String),
    #[error("no data for symbol")]
    NoData,
    #[error("all endpoints exhausted: {0}")]
    Exhausted(String),
}

impl FeedError {
    pub fn into_fleet(self, symbol: &str) -> FleetError {
        FleetError::FeedUnavailable {
            symbol: symbol.to_string(),
            reason: self.to_string(),
        }
    }
}
