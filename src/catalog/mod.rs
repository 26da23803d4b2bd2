//! Variant catalog
//!
//! Enumerates the fixed population at startup as the cartesian product of
//! symbols × timeframes × direction modes × strategy kinds. Variants are never
//! deleted afterwards; the allocator only toggles their `active` flag.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::FleetError;
use crate::lifecycle::ExitParams;
use crate::strategy::{SignalParams, StrategyKind};
use crate::types::{DirectionMode, Timeframe, TimestampMs, VariantId};

/// Per-instrument declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Leverage of the instrument itself (e.g., 3.0 for a 3x ETF). Applied once to P&L.
    pub leverage: f64,
    /// Inverse instrument used for paired confirmation
    pub pair: Option<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            leverage: 1.0,
            pair: None,
        }
    }
}

/// Parameters shared by every variant at creation
#[derive(Debug, Clone, Default)]
pub struct VariantDefaults {
    /// Capital-at-risk budget as a fraction of balance
    pub risk_budget: f64,
    pub exits: ExitParams,
    pub signals: SignalParams,
    /// Replaces `signals` for a given kind
    pub signal_overrides: HashMap<StrategyKind, SignalParams>,
    pub instruments: HashMap<String, InstrumentConfig>,
}

/// One (symbol, timeframe, direction, strategy) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: DirectionMode,
    pub kind: StrategyKind,
    pub poll_interval_ms: i64,
    pub max_hold_ms: i64,
    /// Position size fraction at weight 1.0
    pub base_fraction: f64,
    /// Allocator weight multiplier
    pub weight: f64,
    /// Target fraction of balance committed per entry
    pub allocation: f64,
    pub active: bool,
    pub last_checked_at: Option<TimestampMs>,
    pub signal: SignalParams,
    pub exits: ExitParams,
    pub leverage: f64,
    pub pair: Option<String>,
}

/// Stable id: `SYMBOL:{tf}m:{direction}:{kind}`
pub fn variant_id(
    symbol: &str,
    timeframe: Timeframe,
    direction: DirectionMode,
    kind: StrategyKind,
) -> VariantId {
    format!("{}:{}:{}:{}", symbol, timeframe, direction.label(), kind.label())
}

impl Variant {
    /// A standalone variant with default parameters, sized as if it were the
    /// whole population.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        direction: DirectionMode,
        kind: StrategyKind,
    ) -> Self {
        let symbol = symbol.into();
        let exits = ExitParams::default();
        let poll_interval_ms = timeframe.interval_ms();
        Self {
            id: variant_id(&symbol, timeframe, direction, kind),
            symbol,
            timeframe,
            direction,
            kind,
            poll_interval_ms,
            max_hold_ms: i64::from(exits.max_hold_bars) * poll_interval_ms,
            base_fraction: 0.1,
            weight: 1.0,
            allocation: 0.1,
            active: true,
            last_checked_at: None,
            signal: SignalParams::default(),
            exits,
            leverage: 1.0,
            pair: None,
        }
    }

    pub fn with_signal(mut self, signal: SignalParams) -> Self {
        self.signal = signal;
        self
    }

    /// Replace exit params; max hold is recomputed from `max_hold_bars`
    pub fn with_exits(mut self, exits: ExitParams) -> Self {
        self.max_hold_ms = i64::from(exits.max_hold_bars) * self.poll_interval_ms;
        self.exits = exits;
        self
    }

    pub fn with_instrument(mut self, instrument: &InstrumentConfig) -> Self {
        self.leverage = instrument.leverage;
        self.pair = instrument.pair.clone();
        self
    }

    pub fn with_base_fraction(mut self, fraction: f64) -> Self {
        self.base_fraction = fraction;
        self.allocation = fraction * self.weight;
        self
    }
}

fn dedup<T: Ord + Clone>(items: &[T]) -> Vec<T> {
    items.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Build the full population, sorted by id.
///
/// Fails fast on any empty dimension or invalid parameter set.
pub fn create_population(
    symbols: &[String],
    timeframes: &[Timeframe],
    directions: &[DirectionMode],
    strategies: &[StrategyKind],
    defaults: &VariantDefaults,
) -> Result<Vec<Variant>, FleetError> {
    let symbols: Vec<String> = dedup(
        &symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>(),
    );
    let timeframes = dedup(timeframes);
    let directions = dedup(directions);
    let strategies = dedup(strategies);

    for (name, len) in [
        ("symbols", symbols.len()),
        ("timeframes", timeframes.len()),
        ("directions", directions.len()),
        ("strategies", strategies.len()),
    ] {
        if len == 0 {
            return Err(FleetError::config(format!("population dimension '{}' is empty", name)));
        }
    }
    if timeframes.iter().any(|tf| tf.minutes() == 0) {
        return Err(FleetError::config("timeframes must be >= 1 minute"));
    }
    if !(defaults.risk_budget > 0.0 && defaults.risk_budget <= 1.0) {
        return Err(FleetError::config(format!(
            "risk_budget ({}) must be within (0, 1]",
            defaults.risk_budget
        )));
    }
    defaults.exits.validate()?;
    defaults.signals.validate()?;
    for params in defaults.signal_overrides.values() {
        params.validate()?;
    }

    let count = symbols.len() * timeframes.len() * directions.len() * strategies.len();
    let base_fraction = defaults.risk_budget / count as f64;

    let mut population = Vec::with_capacity(count);
    for symbol in &symbols {
        let instrument = defaults.instruments.get(symbol).cloned().unwrap_or_default();
        if !(instrument.leverage > 0.0) {
            return Err(FleetError::config(format!(
                "leverage for {} must be > 0",
                symbol
            )));
        }
        for &timeframe in &timeframes {
            for &direction in &directions {
                for &kind in &strategies {
                    let signal = defaults
                        .signal_overrides
                        .get(&kind)
                        .cloned()
                        .unwrap_or_else(|| defaults.signals.clone());
                    population.push(
                        Variant::new(symbol.clone(), timeframe, direction, kind)
                            .with_signal(signal)
                            .with_exits(defaults.exits.clone())
                            .with_instrument(&instrument)
                            .with_base_fraction(base_fraction),
                    );
                }
            }
        }
    }

    population.sort_by(|a, b| a.id.cmp(&b.id));

    // Fastest tier starts active; slower tiers wait for the allocator's gate
    if let Some(fastest) = population.iter().map(|v| v.poll_interval_ms).min() {
        for v in population.iter_mut() {
            v.active = v.poll_interval_ms == fastest;
        }
    }

    Ok(population)
}
