#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use fleetbot::catalog::{create_population, Variant, VariantDefaults};
use fleetbot::engine::{Fleet, FleetSettings};
use fleetbot::feed::ReplayFeed;
use fleetbot::lifecycle::ExitParams;
use fleetbot::strategy::{SignalParams, StrategyKind};
use fleetbot::types::{DirectionMode, ExitReason, Side, Timeframe, TradeRecord};

pub const T0: i64 = 1_700_000_000_000;
pub const MINUTE: i64 = 60_000;

/// Fresh per-test directory under the system temp dir
pub fn temp_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fleetbot-it-{}-{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// One price per tick for a single symbol
pub fn replay(symbol: &str, prices: &[f64]) -> Arc<ReplayFeed> {
    let mut csv = String::from("timestamp,symbol,price,volume\n");
    for (i, p) in prices.iter().enumerate() {
        csv.push_str(&format!("{},{},{},\n", T0 + i as i64 * MINUTE, symbol, p));
    }
    Arc::new(ReplayFeed::from_reader(csv.as_bytes()).unwrap())
}

/// Momentum tuned so that [100, 100.5, 101.2] is a clear long entry
pub fn fast_momentum() -> SignalParams {
    SignalParams {
        short_window: 2,
        long_window: 3,
        momentum_saturation: 0.004,
        ..Default::default()
    }
}

pub fn exits(min_hold_ticks: u32) -> ExitParams {
    ExitParams {
        activation_threshold: 0.6,
        take_profit_pct: 3.0,
        stop_loss_pct: -2.0,
        min_hold_ticks,
        ..Default::default()
    }
}

/// Variant(X, 1m, long_only, momentum)
pub fn scenario_variants(min_hold_ticks: u32) -> Vec<Variant> {
    create_population(
        &["X".to_string()],
        &[Timeframe(1)],
        &[DirectionMode::LongOnly],
        &[StrategyKind::Momentum],
        &VariantDefaults {
            risk_budget: 0.8,
            exits: exits(min_hold_ticks),
            signals: fast_momentum(),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn scenario_fleet(prices: &[f64], min_hold_ticks: u32) -> Fleet {
    let mut fleet = Fleet::new(
        scenario_variants(min_hold_ticks),
        replay("X", prices),
        FleetSettings::default(),
    )
    .unwrap();
    fleet.restore();
    fleet
}

pub fn trade(variant_id: &str, pnl_pct: f64, exit_ts: i64) -> TradeRecord {
    TradeRecord {
        id: format!("{variant_id}-{exit_ts}"),
        variant_id: variant_id.to_string(),
        symbol: variant_id.split(':').next().unwrap_or("X").to_string(),
        side: Side::Long,
        entry_price: 100.0,
        exit_price: 100.0 * (1.0 + pnl_pct / 100.0),
        entry_ts: exit_ts - MINUTE,
        exit_ts,
        notional: 100.0,
        pnl_pct,
        pnl_amount: pnl_pct,
        holding_ms: MINUTE,
        exit_reason: if pnl_pct > 0.0 {
            ExitReason::TakeProfit
        } else {
            ExitReason::StopLoss
        },
    }
}
