//! Stochastic exploration
//!
//! Opens random positions at `exploration_rate` so the ledger keeps sampling
//! regimes the systematic kinds never trade. The draw is seeded from the
//! variant id and the window tail, which makes every evaluation reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{SignalGenerator, SignalOutput, SignalParams};
use crate::catalog::Variant;
use crate::types::{Action, Bar, DirectionMode};

pub struct StochasticExploration;

/// FNV-1a over the variant id, window length and last bar
fn seed_for(variant_id: &str, window: &[Bar]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(PRIME);
        }
    };
    feed(variant_id.as_bytes());
    feed(&(window.len() as u64).to_le_bytes());
    if let Some(last) = window.last() {
        feed(&last.price.to_bits().to_le_bytes());
        feed(&last.ts.to_le_bytes());
    }
    hash
}

impl SignalGenerator for StochasticExploration {
    fn name(&self) -> &'static str {
        "exploration"
    }

    fn min_lookback(&self, _params: &SignalParams) -> usize {
        1
    }

    fn evaluate(&self, variant: &Variant, window: &[Bar], _paired: Option<&[Bar]>) -> SignalOutput {
        let params = &variant.signal;
        let mut rng = StdRng::seed_from_u64(seed_for(&variant.id, window));

        if rng.gen::<f64>() >= params.exploration_rate {
            return SignalOutput::hold();
        }

        let action = match variant.direction {
            DirectionMode::LongOnly => Action::EnterLong,
            DirectionMode::ShortOnly => Action::EnterShort,
            DirectionMode::Both => {
                if rng.gen_bool(0.5) {
                    Action::EnterLong
                } else {
                    Action::EnterShort
                }
            }
        };
        let low = params.exploration_min_strength.min(1.0);
        let strength = if low >= 1.0 { 1.0 } else { rng.gen_range(low..=1.0) };

        SignalOutput::new(action, strength)
    }
}
