//! Portfolio ledger - the single simulated balance shared by all variants

use serde::{Deserialize, Serialize};

use crate::error::FleetError;
use crate::types::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub initial_capital: f64,
    /// New entries are blocked while drawdown from peak exceeds this (0 = disabled)
    pub max_drawdown_pct: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            max_drawdown_pct: 0.0,
        }
    }
}

impl PortfolioConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if !(self.initial_capital > 0.0) {
            return Err(FleetError::config("initial_capital must be > 0"));
        }
        if !(0.0..100.0).contains(&self.max_drawdown_pct) {
            return Err(FleetError::config("max_drawdown_pct must be within [0, 100)"));
        }
        Ok(())
    }
}

/// Simulated capital. Mutated only by `apply_close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLedger {
    pub initial_capital: f64,
    pub balance: f64,
    pub peak_balance: f64,
    pub realized_pnl: f64,
    pub closed_trades: usize,
}

impl PortfolioLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            balance: initial_capital,
            peak_balance: initial_capital,
            realized_pnl: 0.0,
            closed_trades: 0,
        }
    }

    /// Realize one closed trade, returning the balance delta
    pub fn apply_close(&mut self, trade: &TradeRecord) -> f64 {
        let delta = trade.notional * trade.pnl_pct / 100.0;
        self.balance += delta;
        self.realized_pnl += delta;
        self.closed_trades += 1;
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        delta
    }

    /// Drawdown from peak, in percent
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        ((self.peak_balance - self.balance) / self.peak_balance * 100.0).max(0.0)
    }

    pub fn entries_blocked(&self, max_drawdown_pct: f64) -> bool {
        max_drawdown_pct > 0.0 && self.drawdown_pct() > max_drawdown_pct
    }

    /// Notional to commit for a variant's target allocation
    pub fn notional_for(&self, allocation: f64) -> f64 {
        (self.balance * allocation).max(0.0)
    }

    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital > 0.0 {
            (self.balance - self.initial_capital) / self.initial_capital * 100.0
        } else {
            0.0
        }
    }
}
