//! Property tests for lifecycle and scoring invariants.
//!
//! Uses proptest to verify:
//! 1. A variant never holds more than one position
//! 2. No exit fires before the minimum hold
//! 3. P&L is zero at the entry price, whatever the side or leverage
//! 4. Scores are a pure function of the trade history
//! 5. Scores never fall as win rate or average P&L rise

mod common;

use common::{trade, MINUTE, T0};
use proptest::prelude::*;
use fleetbot::catalog::{InstrumentConfig, Variant};
use fleetbot::ledger::{composite_score, PerformanceLedger, PerformanceStats, ScoringConfig};
use fleetbot::lifecycle::{pnl_pct, ExitParams, Lifecycle, TickInput, Transition};
use fleetbot::strategy::{SignalOutput, StrategyKind};
use fleetbot::types::{Action, DirectionMode, Side, Timeframe};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![Just(Action::EnterLong), Just(Action::EnterShort), Just(Action::Hold)]
}

fn arb_tick() -> impl Strategy<Value = (f64, Action, f64)> {
    (50.0..150.0_f64, arb_action(), 0.0..1.0_f64)
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn variant(min_hold_ticks: u32, leverage: f64) -> Variant {
    Variant::new("X", Timeframe(1), DirectionMode::Both, StrategyKind::Exploration)
        .with_exits(ExitParams {
            activation_threshold: 0.3,
            min_hold_ticks,
            max_hold_bars: 5,
            reopen_on_reversal: true,
            reopen_cooldown_ticks: 0,
            ..Default::default()
        })
        .with_instrument(&InstrumentConfig {
            leverage,
            pair: None,
        })
}

fn input(i: usize, price: f64, action: Action, strength: f64) -> TickInput {
    TickInput {
        now: T0 + i as i64 * MINUTE,
        price,
        signal: SignalOutput::new(action, strength),
        active: true,
        entries_blocked: false,
        notional: 1_000.0,
    }
}

// ── 1. Single position ───────────────────────────────────────────────

proptest! {
    /// Opens only from flat, closes only from open.
    #[test]
    fn at_most_one_open_position(
        ticks in prop::collection::vec(arb_tick(), 1..80),
        leverage in 1.0..3.0_f64,
    ) {
        let v = variant(1, leverage);
        let mut lc = Lifecycle::default();
        for (i, (price, action, strength)) in ticks.into_iter().enumerate() {
            let was_open = lc.is_open();
            match lc.step(&v, input(i, price, action, strength)) {
                Transition::Opened(_) => prop_assert!(!was_open),
                Transition::Held { .. } => prop_assert!(was_open && lc.is_open()),
                Transition::Closed { reopened, .. } => {
                    prop_assert!(was_open);
                    prop_assert_eq!(reopened.is_some(), lc.is_open());
                }
                Transition::Idle => prop_assert!(!was_open && !lc.is_open()),
            }
        }
    }
}

// ── 2. Minimum hold ──────────────────────────────────────────────────

proptest! {
    /// Every exit happens at least `min_hold_ticks` evaluations after entry.
    #[test]
    fn no_exit_before_min_hold(
        ticks in prop::collection::vec(arb_tick(), 1..80),
        min_hold in 0u32..4,
    ) {
        let v = variant(min_hold, 1.0);
        let mut lc = Lifecycle::default();
        let mut held = 0u32;
        for (i, (price, action, strength)) in ticks.into_iter().enumerate() {
            match lc.step(&v, input(i, price, action, strength)) {
                Transition::Opened(_) => held = 0,
                Transition::Held { .. } => held += 1,
                Transition::Closed { .. } => {
                    prop_assert!(held + 1 >= min_hold, "closed after {} ticks", held + 1);
                    held = 0;
                }
                Transition::Idle => {}
            }
        }
    }
}

// ── 3. P&L at entry ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn pnl_is_zero_at_entry(
        side in arb_side(),
        entry in 0.01..10_000.0_f64,
        leverage in 0.5..5.0_f64,
    ) {
        prop_assert!(pnl_pct(side, entry, entry, leverage).abs() < 1e-9);
    }

    /// Long and short P&L have opposite signs for the same move.
    #[test]
    fn sides_disagree_on_moves(
        entry in 1.0..1_000.0_f64,
        move_pct in 0.01..50.0_f64,
    ) {
        let up = entry * (1.0 + move_pct / 100.0);
        prop_assert!(pnl_pct(Side::Long, entry, up, 1.0) > 0.0);
        prop_assert!(pnl_pct(Side::Short, entry, up, 1.0) < 0.0);
    }
}

// ── 4. Score determinism ─────────────────────────────────────────────

proptest! {
    /// Same history, same score, whether built incrementally or folded.
    #[test]
    fn score_is_deterministic(pnls in prop::collection::vec(-5.0..5.0_f64, 0..40)) {
        let config = ScoringConfig::default();
        let trades: Vec<_> = pnls
            .iter()
            .enumerate()
            .map(|(i, p)| trade("X:1m:both:momentum", *p, T0 + i as i64 * MINUTE))
            .collect();

        let mut a = PerformanceLedger::new(config.clone());
        let mut b = PerformanceLedger::new(config.clone());
        for t in &trades {
            a.record(t);
            b.record(t);
        }
        let folded = PerformanceStats::fold(&trades, config.recent_window);

        let score = a.score("X:1m:both:momentum");
        prop_assert_eq!(score, b.score("X:1m:both:momentum"));
        if !trades.is_empty() {
            prop_assert_eq!(composite_score(&folded, &config), score);
        }
        if let Some(s) = score.value() {
            prop_assert!(s.is_finite());
            prop_assert!(s.abs() <= 1.0 + 1e-9);
        }
    }
}

// ── 5. Score monotonicity ────────────────────────────────────────────

fn arb_stats() -> impl Strategy<Value = PerformanceStats> {
    (
        5usize..60,
        0.0..1.0_f64,
        -200.0..200.0_f64,
        prop::collection::vec(-5.0..5.0_f64, 0..20),
        0u32..8,
        0u32..8,
    )
        .prop_map(|(trades, win_frac, total_pnl_pct, recent, win_streak, loss_streak)| {
            let wins = ((trades as f64) * win_frac).floor() as usize;
            PerformanceStats {
                trades,
                wins,
                losses: trades - wins,
                total_pnl_pct,
                recent_pnl: recent.into(),
                win_streak,
                loss_streak,
                ..Default::default()
            }
        })
}

proptest! {
    /// One more win out of the same number of trades, nothing else changed.
    #[test]
    fn score_never_falls_as_win_rate_rises(stats in arb_stats()) {
        prop_assume!(stats.losses > 0);
        let config = ScoringConfig::default();
        let better = PerformanceStats {
            wins: stats.wins + 1,
            losses: stats.losses - 1,
            ..stats.clone()
        };
        let before = composite_score(&stats, &config).value().unwrap();
        let after = composite_score(&better, &config).value().unwrap();
        prop_assert!(after >= before, "{} -> {}", before, after);
    }

    /// Higher total (so higher average) P&L, nothing else changed.
    #[test]
    fn score_never_falls_as_average_pnl_rises(
        stats in arb_stats(),
        bump in 0.0..100.0_f64,
    ) {
        let config = ScoringConfig::default();
        let better = PerformanceStats {
            total_pnl_pct: stats.total_pnl_pct + bump,
            ..stats.clone()
        };
        let before = composite_score(&stats, &config).value().unwrap();
        let after = composite_score(&better, &config).value().unwrap();
        prop_assert!(after >= before, "{} -> {}", before, after);
    }
}
