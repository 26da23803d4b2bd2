//! Moving-average momentum
//!
//! Long when the short SMA is above the long SMA and price confirms above the
//! short SMA; short on the mirror condition. Strength grows linearly with the
//! relative SMA spread up to `momentum_saturation`.

use super::indicators::sma;
use super::{prices, SignalGenerator, SignalOutput, SignalParams};
use crate::catalog::Variant;
use crate::types::{Action, Bar};

pub struct Momentum;

/// Relative spread `(short - long) / long`
fn sma_spread(values: &[f64], params: &SignalParams) -> Option<(f64, f64)> {
    let short = sma(values, params.short_window)?;
    let long = sma(values, params.long_window)?;
    if long <= 0.0 {
        return None;
    }
    Some(((short - long) / long, short))
}

impl SignalGenerator for Momentum {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn min_lookback(&self, params: &SignalParams) -> usize {
        params.long_window
    }

    fn evaluate(&self, variant: &Variant, window: &[Bar], paired: Option<&[Bar]>) -> SignalOutput {
        let params = &variant.signal;
        let values = prices(window);
        let Some((spread, short)) = sma_spread(&values, params) else {
            return SignalOutput::hold();
        };
        let Some(price) = values.last().copied() else {
            return SignalOutput::hold();
        };

        let action = if spread > 0.0 && price > short {
            Action::EnterLong
        } else if spread < 0.0 && price < short {
            Action::EnterShort
        } else {
            return SignalOutput::hold();
        };

        let mut strength = (spread.abs() / params.momentum_saturation).min(1.0);

        // The paired instrument is an inverse product: it should trend the
        // opposite way. Same-sign spreads contradict the primary signal.
        if let Some(pair_window) = paired {
            let pair_values = prices(pair_window);
            if let Some((pair_spread, _)) = sma_spread(&pair_values, params) {
                if pair_spread != 0.0 && pair_spread.signum() == spread.signum() {
                    strength *= params.paired_contradiction_damping;
                }
            }
        }

        SignalOutput::new(action, strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::bars;
    use crate::strategy::StrategyKind;
    use crate::types::{DirectionMode, Timeframe};

    fn variant() -> Variant {
        Variant::new("X", Timeframe(1), DirectionMode::Both, StrategyKind::Momentum).with_signal(
            SignalParams {
                short_window: 2,
                long_window: 3,
                momentum_saturation: 0.004,
                ..Default::default()
            },
        )
    }

    #[test]
    fn rising_prices_enter_long() {
        let out = Momentum.evaluate(&variant(), &bars(&[100.0, 100.5, 101.2]), None);
        assert_eq!(out.action, Action::EnterLong);
        // spread = (100.85 - 100.5667) / 100.5667 ≈ 0.2817% → 0.704 of 0.4%
        assert!((out.strength - 0.7044).abs() < 1e-3, "got {}", out.strength);
    }

    #[test]
    fn falling_prices_enter_short() {
        let out = Momentum.evaluate(&variant(), &bars(&[101.2, 100.5, 100.0]), None);
        assert_eq!(out.action, Action::EnterShort);
        assert!(out.strength > 0.0);
    }

    #[test]
    fn price_below_short_average_needs_confirmation() {
        // short SMA above long SMA, but the last price dipped under the short SMA
        let out = Momentum.evaluate(&variant(), &bars(&[100.0, 102.0, 101.5]), None);
        assert_eq!(out.action, Action::Hold);
    }

    #[test]
    fn contradicting_pair_damps_strength() {
        let primary = bars(&[100.0, 100.5, 101.2]);
        let confirming = bars(&[50.0, 49.8, 49.5]);
        let contradicting = bars(&[50.0, 50.2, 50.5]);

        let confirmed = Momentum.evaluate(&variant(), &primary, Some(&confirming));
        let damped = Momentum.evaluate(&variant(), &primary, Some(&contradicting));
        assert_eq!(confirmed.action, Action::EnterLong);
        assert_eq!(damped.action, Action::EnterLong);
        assert!((damped.strength - confirmed.strength * 0.5).abs() < 1e-9);
    }

    #[test]
    fn strength_saturates() {
        let out = Momentum.evaluate(&variant(), &bars(&[100.0, 110.0, 130.0]), None);
        assert_eq!(out.strength, 1.0);
    }
}
