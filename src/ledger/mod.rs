//! Performance ledger
//!
//! Per-variant running statistics folded from closed trades, and the
//! composite score the allocator ranks variants by.

pub mod portfolio;

pub use portfolio::PortfolioLedger;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::FleetError;
use crate::strategy::indicators::mean_and_sample_stdev;
use crate::types::{TimestampMs, TradeRecord, VariantId};

/// Composite score weights and sample requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub w_win: f64,
    pub w_avg: f64,
    pub w_sharpe: f64,
    pub w_streak: f64,
    /// Trades required before a variant gets a `Ready` score
    pub min_trades: usize,
    /// Size of the recent P&L window used for the Sharpe-like term
    pub recent_window: usize,
    /// Average P&L% that maps to tanh(1)
    pub pnl_scale_pct: f64,
    /// Streak difference at which the streak term saturates
    pub streak_cap: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            w_win: 0.4,
            w_avg: 0.3,
            w_sharpe: 0.2,
            w_streak: 0.1,
            min_trades: 5,
            recent_window: 20,
            pnl_scale_pct: 2.0,
            streak_cap: 5,
        }
    }
}

impl ScoringConfig {
    /// Non-negative weights keep the score monotone in win rate and P&L
    pub fn validate(&self) -> Result<(), FleetError> {
        let weights = [
            ("w_win", self.w_win),
            ("w_avg", self.w_avg),
            ("w_sharpe", self.w_sharpe),
            ("w_streak", self.w_streak),
        ];
        for (name, w) in weights {
            if !(w >= 0.0 && w.is_finite()) {
                return Err(FleetError::config(format!("scoring.{} ({}) must be >= 0", name, w)));
            }
        }
        if self.min_trades == 0 || self.recent_window < 2 || self.streak_cap == 0 {
            return Err(FleetError::config(
                "scoring needs min_trades >= 1, recent_window >= 2 and streak_cap >= 1",
            ));
        }
        if !(self.pnl_scale_pct > 0.0) {
            return Err(FleetError::config("scoring.pnl_scale_pct must be > 0"));
        }
        Ok(())
    }
}

/// Running statistics for one variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl_pct: f64,
    /// Sum of P&L amounts in account currency
    pub total_profit: f64,
    pub recent_pnl: VecDeque<f64>,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub best_pnl_pct: f64,
    pub worst_pnl_pct: f64,
    pub last_trade_ts: Option<TimestampMs>,
}

impl PerformanceStats {
    /// Fold one closed trade
    pub fn record(&mut self, trade: &TradeRecord, recent_window: usize) {
        if self.trades == 0 {
            self.best_pnl_pct = trade.pnl_pct;
            self.worst_pnl_pct = trade.pnl_pct;
        } else {
            self.best_pnl_pct = self.best_pnl_pct.max(trade.pnl_pct);
            self.worst_pnl_pct = self.worst_pnl_pct.min(trade.pnl_pct);
        }

        self.trades += 1;
        self.total_pnl_pct += trade.pnl_pct;
        self.total_profit += trade.pnl_amount;

        if trade.is_win() {
            self.wins += 1;
            self.win_streak += 1;
            self.loss_streak = 0;
        } else {
            self.losses += 1;
            self.loss_streak += 1;
            self.win_streak = 0;
        }

        self.recent_pnl.push_back(trade.pnl_pct);
        while self.recent_pnl.len() > recent_window.max(1) {
            self.recent_pnl.pop_front();
        }
        self.last_trade_ts = Some(trade.exit_ts);
    }

    /// Rebuild from a trade log
    pub fn fold<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>, recent_window: usize) -> Self {
        let mut stats = Self::default();
        for trade in trades {
            stats.record(trade, recent_window);
        }
        stats
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades > 0 {
            self.wins as f64 / self.trades as f64
        } else {
            0.0
        }
    }

    pub fn avg_pnl_pct(&self) -> f64 {
        if self.trades > 0 {
            self.total_pnl_pct / self.trades as f64
        } else {
            0.0
        }
    }
}

/// Result of scoring a variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Score {
    Ready(f64),
    InsufficientData { trades: usize, required: usize },
}

impl Score {
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Ready(v) => Some(*v),
            Score::InsufficientData { .. } => None,
        }
    }

    pub fn ready(&self) -> Result<f64, FleetError> {
        match *self {
            Score::Ready(v) => Ok(v),
            Score::InsufficientData { trades, required } => Err(FleetError::InsufficientData {
                have: trades,
                need: required,
            }),
        }
    }
}

/// Composite score of a stats record.
///
/// ```text
/// w_win    * (2 * win_rate - 1)
/// w_avg    * tanh(avg_pnl_pct / pnl_scale_pct)
/// w_sharpe * tanh(mean(recent) / stdev(recent))
/// w_streak * clamp(win_streak - loss_streak, ±cap) / cap
/// ```
pub fn composite_score(stats: &PerformanceStats, config: &ScoringConfig) -> Score {
    if stats.trades < config.min_trades.max(1) {
        return Score::InsufficientData {
            trades: stats.trades,
            required: config.min_trades.max(1),
        };
    }

    let win_term = 2.0 * stats.win_rate() - 1.0;
    let avg_term = if config.pnl_scale_pct > 0.0 {
        (stats.avg_pnl_pct() / config.pnl_scale_pct).tanh()
    } else {
        0.0
    };

    let recent: Vec<f64> = stats.recent_pnl.iter().copied().collect();
    let sharpe_term = match mean_and_sample_stdev(&recent) {
        Some((mean, sd)) if sd > 1e-12 => (mean / sd).tanh(),
        _ => 0.0,
    };

    let cap = f64::from(config.streak_cap.max(1));
    let streak = f64::from(stats.win_streak) - f64::from(stats.loss_streak);
    let streak_term = streak.clamp(-cap, cap) / cap;

    Score::Ready(
        config.w_win * win_term
            + config.w_avg * avg_term
            + config.w_sharpe * sharpe_term
            + config.w_streak * streak_term,
    )
}

/// Stats for every variant that has traded
#[derive(Debug, Clone, Default)]
pub struct PerformanceLedger {
    config: ScoringConfig,
    stats: BTreeMap<VariantId, PerformanceStats>,
}

impl PerformanceLedger {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            stats: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn record(&mut self, trade: &TradeRecord) {
        let window = self.config.recent_window;
        self.stats
            .entry(trade.variant_id.clone())
            .or_default()
            .record(trade, window);
    }

    pub fn stats(&self, variant_id: &str) -> Option<&PerformanceStats> {
        self.stats.get(variant_id)
    }

    pub fn trades(&self, variant_id: &str) -> usize {
        self.stats.get(variant_id).map(|s| s.trades).unwrap_or(0)
    }

    pub fn score(&self, variant_id: &str) -> Score {
        match self.stats.get(variant_id) {
            Some(stats) => composite_score(stats, &self.config),
            None => Score::InsufficientData {
                trades: 0,
                required: self.config.min_trades.max(1),
            },
        }
    }

    /// Re-attach persisted stats
    pub fn restore(&mut self, variant_id: VariantId, stats: PerformanceStats) {
        self.stats.insert(variant_id, stats);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariantId, &PerformanceStats)> {
        self.stats.iter()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{ExitReason, Side, TradeRecord};

    pub fn trade(variant_id: &str, pnl_pct: f64, exit_ts: i64) -> TradeRecord {
        TradeRecord {
            id: format!("t-{exit_ts}"),
            variant_id: variant_id.to_string(),
            symbol: "X".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + pnl_pct / 100.0),
            entry_ts: exit_ts - 60_000,
            exit_ts,
            notional: 100.0,
            pnl_pct,
            pnl_amount: pnl_pct,
            holding_ms: 60_000,
            exit_reason: if pnl_pct > 0.0 {
                ExitReason::TakeProfit
            } else {
                ExitReason::StopLoss
            },
        }
    }
}
