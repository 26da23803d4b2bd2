//! Configuration management for the fleet
//!
//! Loads built-in defaults, optional `config/default.*` and `config/local.*`
//! files, then `FLEET__`-prefixed environment variables (via .env).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::allocator::AllocatorConfig;
use crate::catalog::{InstrumentConfig, VariantDefaults};
use crate::engine::{EngineConfig, FleetSettings};
use crate::error::FleetError;
use crate::feed::RetryPolicy;
use crate::ledger::portfolio::PortfolioConfig;
use crate::ledger::ScoringConfig;
use crate::lifecycle::ExitParams;
use crate::strategy::{SignalParams, StrategyKind};
use crate::types::{DirectionMode, Timeframe};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub population: PopulationConfig,
    /// Symbol → leverage / inverse pair
    pub instruments: HashMap<String, InstrumentConfig>,
    pub lifecycle: ExitParams,
    pub signals: SignalParams,
    /// Strategy kind → full parameter set replacing `signals`
    pub signal_overrides: HashMap<String, SignalParams>,
    pub scoring: ScoringConfig,
    pub allocator: AllocatorConfig,
    pub portfolio: PortfolioConfig,
    pub feed: FeedConfig,
    pub persistence: PersistenceConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub symbols: Vec<String>,
    /// Minutes
    pub timeframes: Vec<u32>,
    /// long_only | short_only | both
    pub directions: Vec<String>,
    /// momentum | mean_reversion | breakout | exploration
    pub strategies: Vec<String>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["SOXL".to_string(), "SOXS".to_string()],
            timeframes: vec![1, 5, 15],
            directions: vec!["long_only".to_string(), "both".to_string()],
            strategies: vec![
                "momentum".to_string(),
                "mean_reversion".to_string(),
                "breakout".to_string(),
                "exploration".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Http,
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub mode: FeedMode,
    /// URL templates tried in order; `{symbol}` is substituted
    pub endpoints: Vec<String>,
    /// Dotted JSON path of the price
    pub price_field: String,
    pub volume_field: Option<String>,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub min_request_interval_ms: u64,
    /// Oldest last-known-good quote served after all endpoints fail
    pub max_stale_ms: i64,
    pub replay_file: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::Http,
            endpoints: Vec::new(),
            price_field: "price".to_string(),
            volume_field: None,
            max_retries: 2,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
            request_timeout_ms: 3_000,
            min_request_interval_ms: 200,
            max_stale_ms: 300_000,
            replay_file: None,
        }
    }
}

impl FeedConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff_ms: self.base_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }

    /// Longest a single `get_price` can take before the stale cache is
    /// consulted: every endpoint exhausts its retries on timeouts.
    pub fn worst_case_fetch_ms(&self) -> u64 {
        let endpoints = self.endpoints.len().max(1) as u64;
        self.retry_policy()
            .endpoint_budget_ms(self.request_timeout_ms)
            .saturating_mul(endpoints)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    pub state_file: String,
    pub trade_log_csv: String,
    pub snapshot_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            state_file: "fleet_state.json".to_string(),
            trade_log_csv: "trades.csv".to_string(),
            snapshot_file: "snapshot.json".to_string(),
        }
    }
}

impl PersistenceConfig {
    fn resolve(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.data_dir).join(file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.state_file)
    }

    pub fn trade_log_path(&self) -> PathBuf {
        self.resolve(&self.trade_log_csv)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve(&self.snapshot_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Serve the HTTP dashboard (requires the `dashboard` feature)
    pub enabled: bool,
    pub bind_addr: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Typed population dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub directions: Vec<DirectionMode>,
    pub strategies: Vec<StrategyKind>,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("population.symbols", vec!["SOXL", "SOXS"])?
            .set_default("population.timeframes", vec![1, 5, 15])?
            .set_default("population.directions", vec!["long_only", "both"])?
            .set_default(
                "population.strategies",
                vec!["momentum", "mean_reversion", "breakout", "exploration"],
            )?
            .set_default("engine.tick_interval_ms", 60_000)?
            .set_default("engine.allocator_every_ticks", 10)?
            .set_default("engine.snapshot_every_ticks", 1)?
            .set_default("engine.dashboard_every_ticks", 30)?
            .set_default("portfolio.initial_capital", 10_000.0)?
            .set_default("portfolio.max_drawdown_pct", 0.0)?
            .set_default("feed.mode", "http")?
            .set_default("persistence.data_dir", "./data")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FLEET__*)
            .add_source(
                Environment::with_prefix("FLEET")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("population.symbols")
                    .with_list_parse_key("population.timeframes")
                    .with_list_parse_key("population.directions")
                    .with_list_parse_key("population.strategies")
                    .with_list_parse_key("feed.endpoints"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Parse the population dimensions
    pub fn population(&self) -> Result<Population, FleetError> {
        let directions = self
            .population
            .directions
            .iter()
            .map(|d| {
                DirectionMode::from_str(d)
                    .ok_or_else(|| FleetError::config(format!("unknown direction '{}'", d)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let strategies = self
            .population
            .strategies
            .iter()
            .map(|s| {
                StrategyKind::from_str(s)
                    .ok_or_else(|| FleetError::config(format!("unknown strategy '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Population {
            symbols: self.population.symbols.clone(),
            timeframes: self.population.timeframes.iter().map(|&m| Timeframe(m)).collect(),
            directions,
            strategies,
        })
    }

    /// Per-kind signal overrides keyed by parsed kind
    pub fn signal_overrides_by_kind(&self) -> Result<HashMap<StrategyKind, SignalParams>, FleetError> {
        self.signal_overrides
            .iter()
            .map(|(name, params)| {
                StrategyKind::from_str(name)
                    .map(|kind| (kind, params.clone()))
                    .ok_or_else(|| FleetError::config(format!("unknown strategy override '{}'", name)))
            })
            .collect()
    }

    /// Instrument declarations with normalized symbol keys
    pub fn instruments_by_symbol(&self) -> HashMap<String, InstrumentConfig> {
        self.instruments
            .iter()
            .map(|(symbol, inst)| {
                (
                    symbol.trim().to_uppercase(),
                    InstrumentConfig {
                        leverage: inst.leverage,
                        pair: inst.pair.as_ref().map(|p| p.trim().to_uppercase()),
                    },
                )
            })
            .collect()
    }

    pub fn variant_defaults(&self) -> Result<VariantDefaults, FleetError> {
        Ok(VariantDefaults {
            risk_budget: self.allocator.risk_budget,
            exits: self.lifecycle.clone(),
            signals: self.signals.clone(),
            signal_overrides: self.signal_overrides_by_kind()?,
            instruments: self.instruments_by_symbol(),
        })
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            engine: self.engine.clone(),
            scoring: self.scoring.clone(),
            allocator: self.allocator.clone(),
            portfolio: self.portfolio.clone(),
        }
    }

    /// Check every section; only configuration errors are fatal at startup
    pub fn validate(&self) -> Result<(), FleetError> {
        let population = self.population()?;
        if population.symbols.is_empty()
            || population.timeframes.is_empty()
            || population.directions.is_empty()
            || population.strategies.is_empty()
        {
            return Err(FleetError::config("every population dimension needs at least one entry"));
        }
        self.engine.validate()?;
        self.lifecycle.validate()?;
        self.signals.validate()?;
        for params in self.signal_overrides_by_kind()?.values() {
            params.validate()?;
        }
        self.scoring.validate()?;
        self.allocator.validate()?;
        self.portfolio.validate()?;
        for (symbol, inst) in self.instruments_by_symbol() {
            if !(inst.leverage > 0.0) {
                return Err(FleetError::config(format!("leverage for {} must be > 0", symbol)));
            }
        }
        match self.feed.mode {
            FeedMode::Http if self.feed.endpoints.is_empty() => {
                return Err(FleetError::config("feed.endpoints is empty for http mode"));
            }
            FeedMode::Replay if self.feed.replay_file.is_none() => {
                return Err(FleetError::config("feed.replay_file is required for replay mode"));
            }
            _ => {}
        }
        if self.feed.mode == FeedMode::Http {
            let needed = self.feed.worst_case_fetch_ms();
            if self.engine.fetch_timeout_ms < needed {
                return Err(FleetError::config(format!(
                    "engine.fetch_timeout_ms ({}) cuts off the feed fallback chain, which can take up to {} ms",
                    self.engine.fetch_timeout_ms, needed
                )));
            }
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "symbols={:?} timeframes={:?} directions={:?} strategies={:?} capital={:.0} risk_budget={:.2} top_k={} feed={:?}",
            self.population.symbols,
            self.population.timeframes,
            self.population.directions,
            self.population.strategies,
            self.portfolio.initial_capital,
            self.allocator.risk_budget,
            self.allocator.top_k,
            self.feed.mode
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            feed: FeedConfig {
                endpoints: vec!["https://quotes.example.test/{symbol}".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_with_an_endpoint() {
        assert!(valid().validate().is_ok());
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut cfg = valid();
        cfg.population.strategies.push("martingale".to_string());
        assert!(matches!(cfg.validate(), Err(FleetError::Configuration(_))));
    }

    #[test]
    fn inverted_exits_are_rejected() {
        let mut cfg = valid();
        cfg.lifecycle.stop_loss_pct = 4.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fetch_timeout_must_leave_room_for_fallback() {
        let mut cfg = valid();
        cfg.feed
            .endpoints
            .push("https://backup.example.test/{symbol}".to_string());
        assert!(cfg.feed.worst_case_fetch_ms() <= cfg.engine.fetch_timeout_ms);
        assert!(cfg.validate().is_ok());

        // A primary that hangs for 3 × 8s would starve the second endpoint
        cfg.feed.request_timeout_ms = 8_000;
        cfg.engine.fetch_timeout_ms = 10_000;
        assert!(matches!(cfg.validate(), Err(FleetError::Configuration(_))));

        // Replay never goes through the retry chain
        cfg.feed.mode = FeedMode::Replay;
        cfg.feed.replay_file = Some("replay.csv".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn negative_score_weights_are_rejected() {
        let mut cfg = valid();
        cfg.scoring.w_win = -0.4;
        assert!(matches!(cfg.validate(), Err(FleetError::Configuration(_))));

        let mut cfg = valid();
        cfg.allocator.sensitivity = -1.0;
        assert!(matches!(cfg.validate(), Err(FleetError::Configuration(_))));
    }

    #[test]
    fn instruments_are_normalized() {
        let mut cfg = valid();
        cfg.instruments.insert(
            "nvdl".to_string(),
            InstrumentConfig {
                leverage: 2.0,
                pair: Some("nvdq".to_string()),
            },
        );
        let map = cfg.instruments_by_symbol();
        assert_eq!(map["NVDL"].pair.as_deref(), Some("NVDQ"));
    }

    #[test]
    fn overrides_parse_by_kind() {
        let mut cfg = valid();
        cfg.signal_overrides.insert(
            "breakout".to_string(),
            SignalParams {
                breakout_lookback: 10,
                ..Default::default()
            },
        );
        let map = cfg.signal_overrides_by_kind().unwrap();
        assert_eq!(map[&StrategyKind::Breakout].breakout_lookback, 10);
    }
}
