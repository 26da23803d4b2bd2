//! Rolling-range breakout
//!
//! Fires when the current price clears the prior `breakout_lookback` bar high
//! (or low) by at least `breakout_min_excursion` volatility units, where
//! volatility is the mean absolute bar-to-bar change over the same bars.
//! An optional volume gate requires participation above the prior average.

use super::indicators::{prior_extremes, prior_mean_abs_change};
use super::{prices, SignalGenerator, SignalOutput, SignalParams};
use crate::catalog::Variant;
use crate::types::{Action, Bar};

pub struct Breakout;

/// Volume confirmation. Without volume data the gate is open unless
/// `require_volume` is set.
fn volume_confirms(window: &[Bar], params: &SignalParams) -> bool {
    let Some((current, prior)) = window.split_last() else {
        return false;
    };
    let Some(current_volume) = current.volume else {
        return !params.require_volume;
    };
    let start = prior.len().saturating_sub(params.breakout_lookback);
    let prior_volumes: Vec<f64> = prior[start..].iter().filter_map(|b| b.volume).collect();
    if prior_volumes.is_empty() {
        return !params.require_volume;
    }
    let mean = prior_volumes.iter().sum::<f64>() / prior_volumes.len() as f64;
    current_volume >= params.volume_multiple * mean
}

impl SignalGenerator for Breakout {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn min_lookback(&self, params: &SignalParams) -> usize {
        params.breakout_lookback + 1
    }

    fn evaluate(&self, variant: &Variant, window: &[Bar], _paired: Option<&[Bar]>) -> SignalOutput {
        let params = &variant.signal;
        let values = prices(window);
        let (Some((high, low)), Some(vol), Some(&price)) = (
            prior_extremes(&values, params.breakout_lookback),
            prior_mean_abs_change(&values, params.breakout_lookback),
            values.last(),
        ) else {
            return SignalOutput::hold();
        };

        // Flat history would otherwise turn any tick into an infinite excursion
        let vol = vol.max(price.abs() * 1e-6);

        let up = (price - high) / vol;
        let down = (low - price) / vol;

        let (action, excursion) = if up > 0.0 && up >= params.breakout_min_excursion {
            (Action::EnterLong, up)
        } else if down > 0.0 && down >= params.breakout_min_excursion {
            (Action::EnterShort, down)
        } else {
            return SignalOutput::hold();
        };

        if !volume_confirms(window, params) {
            tracing::debug!(variant = %variant.id, "Breakout without volume confirmation");
            return SignalOutput::hold();
        }

        SignalOutput::new(action, excursion / params.breakout_full_excursion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{bars, bars_with_volume};
    use crate::strategy::StrategyKind;
    use crate::types::{DirectionMode, Timeframe};

    fn variant(require_volume: bool) -> Variant {
        Variant::new("X", Timeframe(1), DirectionMode::Both, StrategyKind::Breakout).with_signal(
            SignalParams {
                breakout_lookback: 4,
                require_volume,
                ..Default::default()
            },
        )
    }

    #[test]
    fn new_high_enters_long() {
        // prior: 100, 101, 100, 101 → high 101, vol 1.0; close 102.5 → 1.5 units
        let out = Breakout.evaluate(&variant(false), &bars(&[100.0, 101.0, 100.0, 101.0, 102.5]), None);
        assert_eq!(out.action, Action::EnterLong);
        assert!((out.strength - 0.5).abs() < 1e-9, "got {}", out.strength);
    }

    #[test]
    fn new_low_enters_short() {
        let out = Breakout.evaluate(&variant(false), &bars(&[100.0, 101.0, 100.0, 101.0, 97.0]), None);
        assert_eq!(out.action, Action::EnterShort);
        assert_eq!(out.strength, 1.0);
    }

    #[test]
    fn inside_range_holds() {
        let out = Breakout.evaluate(&variant(false), &bars(&[100.0, 101.0, 100.0, 101.0, 100.5]), None);
        assert_eq!(out.action, Action::Hold);
    }

    #[test]
    fn marginal_breakout_below_min_excursion_holds() {
        // 101.2 clears the high by 0.2 units < 0.5
        let out = Breakout.evaluate(&variant(false), &bars(&[100.0, 101.0, 100.0, 101.0, 101.2]), None);
        assert_eq!(out.action, Action::Hold);
    }

    #[test]
    fn thin_volume_blocks_breakout() {
        let thin = bars_with_volume(&[
            (100.0, 1000.0),
            (101.0, 1000.0),
            (100.0, 1000.0),
            (101.0, 1000.0),
            (102.5, 1200.0),
        ]);
        assert_eq!(Breakout.evaluate(&variant(false), &thin, None).action, Action::Hold);

        let heavy = bars_with_volume(&[
            (100.0, 1000.0),
            (101.0, 1000.0),
            (100.0, 1000.0),
            (101.0, 1000.0),
            (102.5, 2000.0),
        ]);
        assert_eq!(Breakout.evaluate(&variant(false), &heavy, None).action, Action::EnterLong);
    }

    #[test]
    fn missing_volume_fails_when_required() {
        let window = bars(&[100.0, 101.0, 100.0, 101.0, 102.5]);
        assert_eq!(Breakout.evaluate(&variant(true), &window, None).action, Action::Hold);
    }
}
