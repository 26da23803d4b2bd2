//! Fleet snapshot and the periodic log dashboard

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Side, TimestampMs, VariantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub side: Side,
    pub entry_price: f64,
    pub entry_ts: TimestampMs,
    pub notional: f64,
    pub ticks_held: u32,
    /// Last observed price, stale quotes included
    pub mark_price: Option<f64>,
    pub unrealized_pnl_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub variant_id: VariantId,
    pub symbol: String,
    pub timeframe: String,
    pub strategy: String,
    pub direction: String,
    pub active: bool,
    pub weight: f64,
    pub allocation: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub total_profit: f64,
    pub last_checked_at: Option<TimestampMs>,
    /// None until the variant has enough trades to score
    pub score: Option<f64>,
    pub position: Option<PositionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub ts: TimestampMs,
    pub tick: u64,
    pub balance: f64,
    pub initial_capital: f64,
    pub realized_pnl: f64,
    pub drawdown_pct: f64,
    pub closed_trades: usize,
    pub open_positions: usize,
    pub active_variants: usize,
    pub variants: Vec<VariantSnapshot>,
}

impl FleetSnapshot {
    pub fn variant(&self, id: &str) -> Option<&VariantSnapshot> {
        self.variants.iter().find(|v| v.variant_id == id)
    }

    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital > 0.0 {
            (self.balance - self.initial_capital) / self.initial_capital * 100.0
        } else {
            0.0
        }
    }

    /// Scored variants ranked by score, best first
    pub fn leaders(&self, n: usize) -> Vec<&VariantSnapshot> {
        let mut scored: Vec<&VariantSnapshot> =
            self.variants.iter().filter(|v| v.score.is_some()).collect();
        scored.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::MIN)
                .total_cmp(&a.score.unwrap_or(f64::MIN))
                .then_with(|| a.variant_id.cmp(&b.variant_id))
        });
        scored.truncate(n);
        scored
    }
}

pub fn log_dashboard(snapshot: &FleetSnapshot) {
    info!("╔══════════════════════════════════════════════════════════════════════════╗");
    info!("║  📋 VARIANT FLEET DASHBOARD                                              ║");
    info!("╠══════════════════════════════════════════════════════════════════════════╣");
    info!(
        "║  💰 Balance: ${:.2} (initial: ${:.2}) | Return: {:+.2}% | DD: {:.2}%",
        snapshot.balance,
        snapshot.initial_capital,
        snapshot.total_return_pct(),
        snapshot.drawdown_pct
    );
    info!(
        "║  📈 Realized: ${:+.2} | Trades: {} | Active: {}/{} | Open: {}",
        snapshot.realized_pnl,
        snapshot.closed_trades,
        snapshot.active_variants,
        snapshot.variants.len(),
        snapshot.open_positions
    );

    let leaders = snapshot.leaders(5);
    if !leaders.is_empty() {
        info!("║  ─── Top Variants ───");
        for v in leaders {
            info!(
                "║  {:<36} score {:+.3} | {:.1}% WR ({}) | avg {:+.2}% | w {:.2}",
                v.variant_id,
                v.score.unwrap_or_default(),
                v.win_rate * 100.0,
                v.trades,
                v.avg_pnl,
                v.weight
            );
        }
    }

    let open: Vec<&VariantSnapshot> = snapshot.variants.iter().filter(|v| v.position.is_some()).collect();
    if open.is_empty() {
        info!("║  📌 No open positions");
    } else {
        info!("║  ─── Open Positions ───");
        for v in open {
            if let Some(p) = &v.position {
                let unrealized = p
                    .unrealized_pnl_pct
                    .map(|u| format!("{:+.2}%", u))
                    .unwrap_or_else(|| "n/a".to_string());
                info!(
                    "║  {:<36} {} ${:.2} @ {:.4} | P&L {} | {} ticks",
                    v.variant_id, p.side, p.notional, p.entry_price, unrealized, p.ticks_held
                );
            }
        }
    }

    info!("╚══════════════════════════════════════════════════════════════════════════╝");
}
