//! Signal generation
//!
//! Every strategy kind implements [`SignalGenerator`]: a pure mapping from a
//! variant's price window (and optionally the window of its paired inverse
//! instrument) to an [`Action`] plus a strength in `[0, 1]`. Generators never
//! see or mutate position state.
//!
//! Minimum lookback per kind:
//! - momentum: `long_window` bars
//! - mean reversion: `max(rsi_period + 1, band_period)` bars
//! - breakout: `breakout_lookback + 1` bars
//! - exploration: 1 bar
//!
//! Shorter windows always yield `Hold` with strength 0.

pub mod indicators;

mod breakout;
mod exploration;
mod mean_reversion;
mod momentum;

pub use breakout::Breakout;
pub use exploration::StochasticExploration;
pub use mean_reversion::MeanReversion;
pub use momentum::Momentum;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::Variant;
use crate::error::FleetError;
use crate::types::{Action, Bar};

/// Strategy kind tag carried by every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum,
    MeanReversion,
    Breakout,
    Exploration,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Momentum => "momentum",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::Breakout => "breakout",
            StrategyKind::Exploration => "exploration",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "momentum" => Some(StrategyKind::Momentum),
            "mean_reversion" | "meanreversion" | "reversion" => Some(StrategyKind::MeanReversion),
            "breakout" => Some(StrategyKind::Breakout),
            "exploration" | "stochastic" => Some(StrategyKind::Exploration),
            _ => None,
        }
    }

    /// The generator implementing this kind
    pub fn generator(&self) -> &'static dyn SignalGenerator {
        match self {
            StrategyKind::Momentum => &Momentum,
            StrategyKind::MeanReversion => &MeanReversion,
            StrategyKind::Breakout => &Breakout,
            StrategyKind::Exploration => &StochasticExploration,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-variant signal thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    /// Momentum: short SMA length
    pub short_window: usize,
    /// Momentum: long SMA length
    pub long_window: usize,
    /// Momentum: relative SMA spread at which strength saturates at 1.0
    pub momentum_saturation: f64,
    /// Momentum: strength multiplier when the inverse pair trends the same way
    pub paired_contradiction_damping: f64,
    /// Mean reversion: RSI period (Wilder)
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Mean reversion: band SMA length
    pub band_period: usize,
    /// Mean reversion: band half-width in standard deviations
    pub band_k: f64,
    /// Breakout: bars in the rolling high/low (excluding the current bar)
    pub breakout_lookback: usize,
    /// Breakout: minimum excursion in volatility units
    pub breakout_min_excursion: f64,
    /// Breakout: excursion at which strength saturates at 1.0
    pub breakout_full_excursion: f64,
    /// Breakout: current volume must be at least this multiple of the prior mean
    pub volume_multiple: f64,
    /// Breakout: fail the volume gate when the feed reports no volume
    pub require_volume: bool,
    /// Exploration: probability of an entry per evaluation
    pub exploration_rate: f64,
    /// Exploration: lower bound of the drawn strength
    pub exploration_min_strength: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            short_window: 5,
            long_window: 20,
            momentum_saturation: 0.01,
            paired_contradiction_damping: 0.5,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            band_period: 20,
            band_k: 2.0,
            breakout_lookback: 20,
            breakout_min_excursion: 0.5,
            breakout_full_excursion: 3.0,
            volume_multiple: 1.5,
            require_volume: false,
            exploration_rate: 0.1,
            exploration_min_strength: 0.5,
        }
    }
}

impl SignalParams {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.short_window == 0 || self.short_window >= self.long_window {
            return Err(FleetError::config(format!(
                "short_window ({}) must be >= 1 and < long_window ({})",
                self.short_window, self.long_window
            )));
        }
        if !(self.momentum_saturation > 0.0) {
            return Err(FleetError::config("momentum_saturation must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.paired_contradiction_damping) {
            return Err(FleetError::config(
                "paired_contradiction_damping must be within [0, 1]",
            ));
        }
        if self.rsi_period == 0 || self.band_period < 2 || self.breakout_lookback < 2 {
            return Err(FleetError::config(
                "rsi_period >= 1, band_period >= 2 and breakout_lookback >= 2 are required",
            ));
        }
        if !(0.0 < self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought < 100.0)
        {
            return Err(FleetError::config(
                "RSI thresholds must satisfy 0 < oversold < overbought < 100",
            ));
        }
        if !(self.band_k > 0.0) || !(self.breakout_full_excursion > 0.0) {
            return Err(FleetError::config(
                "band_k and breakout_full_excursion must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate)
            || !(0.0..=1.0).contains(&self.exploration_min_strength)
        {
            return Err(FleetError::config(
                "exploration_rate and exploration_min_strength must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Output of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    pub action: Action,
    pub strength: f64,
}

impl SignalOutput {
    pub fn new(action: Action, strength: f64) -> Self {
        if action == Action::Hold {
            return Self::hold();
        }
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { action, strength }
    }

    pub fn hold() -> Self {
        Self {
            action: Action::Hold,
            strength: 0.0,
        }
    }
}

/// Shared interface of all strategy kinds
pub trait SignalGenerator: Send + Sync {
    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Bars required before this kind can emit anything but `Hold`
    fn min_lookback(&self, params: &SignalParams) -> usize;

    /// Evaluate the latest bar of `window`. `paired` is the window of the
    /// variant's declared inverse instrument on the same timeframe, if any.
    fn evaluate(&self, variant: &Variant, window: &[Bar], paired: Option<&[Bar]>) -> SignalOutput;
}

/// Evaluate `variant` against its window, enforcing the minimum lookback.
pub fn evaluate(variant: &Variant, window: &[Bar], paired: Option<&[Bar]>) -> SignalOutput {
    let generator = variant.kind.generator();
    let required = generator.min_lookback(&variant.signal);
    if window.len() < required {
        tracing::debug!(
            variant = %variant.id,
            reason = %FleetError::InsufficientData { have: window.len(), need: required },
            "Holding"
        );
        return SignalOutput::hold();
    }
    generator.evaluate(variant, window, paired)
}

/// Closing prices of a window
pub(crate) fn prices(window: &[Bar]) -> Vec<f64> {
    window.iter().map(|b| b.price).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::Bar;

    pub fn bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Bar {
                ts: 1_700_000_000_000 + i as i64 * 60_000,
                price,
                volume: None,
            })
            .collect()
    }

    pub fn bars_with_volume(points: &[(f64, f64)]) -> Vec<Bar> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(price, volume))| Bar {
                ts: 1_700_000_000_000 + i as i64 * 60_000,
                price,
                volume: Some(volume),
            })
            .collect()
    }
}
