//! RSI / band mean reversion
//!
//! Enters against stretched moves: long when RSI is at or below the oversold
//! threshold or price touches the lower band, short on the mirror. Each
//! trigger produces a strength of 0.5 at its threshold rising to 1.0 at the
//! extreme; the stronger of the two wins.

use super::indicators::{bollinger, rsi_wilder};
use super::{prices, SignalGenerator, SignalOutput, SignalParams};
use crate::catalog::Variant;
use crate::types::{Action, Bar};

pub struct MeanReversion;

fn rsi_strengths(rsi: f64, params: &SignalParams) -> (f64, f64) {
    let long = if rsi <= params.rsi_oversold {
        0.5 + 0.5 * (params.rsi_oversold - rsi) / params.rsi_oversold
    } else {
        0.0
    };
    let short = if rsi >= params.rsi_overbought {
        0.5 + 0.5 * (rsi - params.rsi_overbought) / (100.0 - params.rsi_overbought)
    } else {
        0.0
    };
    (long, short)
}

/// Band touch scores 0.5; a close one full band width beyond the middle scores 1.0.
fn band_strengths(price: f64, upper: f64, mid: f64, lower: f64) -> (f64, f64) {
    let half_width = upper - mid;
    if half_width <= f64::EPSILON {
        return (0.0, 0.0);
    }
    let long = if price <= lower {
        ((mid - price) / (2.0 * half_width)).min(1.0)
    } else {
        0.0
    };
    let short = if price >= upper {
        ((price - mid) / (2.0 * half_width)).min(1.0)
    } else {
        0.0
    };
    (long, short)
}

impl SignalGenerator for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn min_lookback(&self, params: &SignalParams) -> usize {
        (params.rsi_period + 1).max(params.band_period)
    }

    fn evaluate(&self, variant: &Variant, window: &[Bar], _paired: Option<&[Bar]>) -> SignalOutput {
        let params = &variant.signal;
        let values = prices(window);
        let Some(&price) = values.last() else {
            return SignalOutput::hold();
        };

        let (mut long, mut short) = match rsi_wilder(&values, params.rsi_period) {
            Some(rsi) => rsi_strengths(rsi, params),
            None => (0.0, 0.0),
        };
        if let Some((upper, mid, lower)) = bollinger(&values, params.band_period, params.band_k) {
            let (band_long, band_short) = band_strengths(price, upper, mid, lower);
            long = long.max(band_long);
            short = short.max(band_short);
        }

        // Both can fire on pathological windows; the stronger side wins.
        if long > 0.0 && long >= short {
            SignalOutput::new(Action::EnterLong, long)
        } else if short > 0.0 {
            SignalOutput::new(Action::EnterShort, short)
        } else {
            SignalOutput::hold()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::bars;
    use crate::strategy::StrategyKind;
    use crate::types::{DirectionMode, Timeframe};

    fn variant() -> Variant {
        Variant::new("X", Timeframe(1), DirectionMode::Both, StrategyKind::MeanReversion)
            .with_signal(SignalParams {
                rsi_period: 5,
                band_period: 6,
                ..Default::default()
            })
    }

    #[test]
    fn selloff_enters_long() {
        let out = MeanReversion.evaluate(
            &variant(),
            &bars(&[100.0, 99.0, 98.0, 97.0, 96.0, 95.0, 90.0]),
            None,
        );
        assert_eq!(out.action, Action::EnterLong);
        assert_eq!(out.strength, 1.0); // RSI 0
    }

    #[test]
    fn rally_enters_short() {
        let out = MeanReversion.evaluate(
            &variant(),
            &bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 110.0]),
            None,
        );
        assert_eq!(out.action, Action::EnterShort);
        assert_eq!(out.strength, 1.0);
    }

    #[test]
    fn choppy_prices_hold() {
        let out = MeanReversion.evaluate(
            &variant(),
            &bars(&[100.0, 101.0, 100.0, 101.0, 100.0, 101.0, 100.5]),
            None,
        );
        assert_eq!(out.action, Action::Hold);
    }

    #[test]
    fn threshold_rsi_scores_half() {
        let params = SignalParams::default();
        let (long, short) = rsi_strengths(30.0, &params);
        assert!((long - 0.5).abs() < 1e-12);
        assert_eq!(short, 0.0);
        let (_, short) = rsi_strengths(100.0, &params);
        assert!((short - 1.0).abs() < 1e-12);
    }

    #[test]
    fn band_touch_scores_half() {
        let (long, short) = band_strengths(96.0, 104.0, 100.0, 96.0);
        assert!((long - 0.5).abs() < 1e-12);
        assert_eq!(short, 0.0);
        let (_, short) = band_strengths(120.0, 104.0, 100.0, 96.0);
        assert_eq!(short, 1.0);
    }
}
