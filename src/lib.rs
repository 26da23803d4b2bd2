//! FleetBot Library
//!
//! Paper-trading population manager: runs many strategy variants per
//! symbol/timeframe, scores them and reallocates capital adaptively.

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod lifecycle;
pub mod persistence;
pub mod report;
pub mod scheduler;
pub mod strategy;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use engine::{Fleet, FleetSettings, VariantEvent};
pub use error::{FeedError, FleetError};
