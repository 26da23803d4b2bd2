//! Position lifecycle - per-variant open/hold/close state machine
//!
//! Implements:
//! - Flat → Open on a strong enough entry signal the direction mode permits
//! - Exit checks in fixed priority: min-hold, take-profit, stop-loss,
//!   time limit, signal reversal
//! - Optional reopen on the opposite side after a reversal, with cooldown
//!
//! The machine never reads prices itself. A tick with no usable price is
//! simply not stepped, so missing data can never force a close.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Variant;
use crate::error::FleetError;
use crate::strategy::SignalOutput;
use crate::types::{Action, ExitReason, Side, TimestampMs, TradeRecord};

/// Entry/exit thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitParams {
    /// Minimum signal strength to open
    pub activation_threshold: f64,
    /// Take-profit in leveraged percent (e.g., 3.0 = +3%)
    pub take_profit_pct: f64,
    /// Stop-loss in leveraged percent, negative (e.g., -2.0 = -2%)
    pub stop_loss_pct: f64,
    /// Ticks a position must be held before any exit is considered
    pub min_hold_ticks: u32,
    /// Max hold expressed in bars of the variant's timeframe
    pub max_hold_bars: u32,
    /// Minimum opposite-signal strength to exit on reversal
    pub reversal_threshold: f64,
    /// Flip to the opposite side after a reversal exit
    pub reopen_on_reversal: bool,
    /// Evaluations to wait before reopening (0 = same tick)
    pub reopen_cooldown_ticks: u32,
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            activation_threshold: 0.6,
            take_profit_pct: 3.0,
            stop_loss_pct: -2.0,
            min_hold_ticks: 1,
            max_hold_bars: 60,
            reversal_threshold: 0.6,
            reopen_on_reversal: false,
            reopen_cooldown_ticks: 1,
        }
    }
}

impl ExitParams {
    pub fn validate(&self) -> Result<(), FleetError> {
        if !(self.stop_loss_pct < 0.0 && self.take_profit_pct > 0.0) {
            return Err(FleetError::config(format!(
                "stop_loss_pct ({}) must be negative and take_profit_pct ({}) positive",
                self.stop_loss_pct, self.take_profit_pct
            )));
        }
        if !(0.0..=1.0).contains(&self.activation_threshold)
            || !(0.0..=1.0).contains(&self.reversal_threshold)
        {
            return Err(FleetError::config(
                "activation_threshold and reversal_threshold must be within [0, 1]",
            ));
        }
        if self.max_hold_bars == 0 {
            return Err(FleetError::config("max_hold_bars must be >= 1"));
        }
        Ok(())
    }
}

/// An open position. Owned by exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_ts: TimestampMs,
    pub notional: f64,
    pub ticks_held: u32,
}

impl Position {
    pub fn pnl_pct(&self, price: f64, leverage: f64) -> f64 {
        pnl_pct(self.side, self.entry_price, price, leverage)
    }
}

/// Leveraged P&L in percent
pub fn pnl_pct(side: Side, entry_price: f64, price: f64, leverage: f64) -> f64 {
    if entry_price <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    let raw = match side {
        Side::Long => price / entry_price - 1.0,
        Side::Short => entry_price / price - 1.0,
    };
    raw * 100.0 * leverage
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    OpenLong,
    OpenShort,
}

/// Inputs for one evaluation of a variant
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub now: TimestampMs,
    pub price: f64,
    pub signal: SignalOutput,
    /// Variant is in the allocator's active set
    pub active: bool,
    /// Portfolio drawdown guard tripped
    pub entries_blocked: bool,
    /// Notional to commit if a position opens
    pub notional: f64,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened(Position),
    Held { pnl_pct: f64 },
    Closed {
        trade: TradeRecord,
        /// Side reopened on the same tick after a reversal exit
        reopened: Option<Position>,
    },
    Idle,
}

/// Per-variant lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub position: Option<Position>,
    /// Pending reopen after a reversal exit: (side, evaluations remaining)
    #[serde(default)]
    pub pending_reopen: Option<(Side, u32)>,
}

impl Lifecycle {
    pub fn restore(position: Option<Position>, pending_reopen: Option<(Side, u32)>) -> Self {
        Self {
            position,
            pending_reopen,
        }
    }

    pub fn state(&self) -> PositionState {
        match self.position.as_ref().map(|p| p.side) {
            None => PositionState::Flat,
            Some(Side::Long) => PositionState::OpenLong,
            Some(Side::Short) => PositionState::OpenShort,
        }
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Advance the machine by one evaluation
    pub fn step(&mut self, variant: &Variant, input: TickInput) -> Transition {
        match self.position.take() {
            Some(mut pos) => {
                pos.ticks_held = pos.ticks_held.saturating_add(1);
                let pnl = pos.pnl_pct(input.price, variant.leverage);

                match exit_reason(&variant.exits, variant.max_hold_ms, &pos, pnl, input.now, &input.signal) {
                    None => {
                        self.position = Some(pos);
                        Transition::Held { pnl_pct: pnl }
                    }
                    Some(reason) => {
                        let trade = close_trade(variant, &pos, input.price, input.now, pnl, reason);
                        let reopened = self.after_close(variant, &pos, reason, &input);
                        Transition::Closed { trade, reopened }
                    }
                }
            }
            None => self.step_flat(variant, &input),
        }
    }

    fn after_close(
        &mut self,
        variant: &Variant,
        closed: &Position,
        reason: ExitReason,
        input: &TickInput,
    ) -> Option<Position> {
        if reason != ExitReason::SignalReversal || !variant.exits.reopen_on_reversal {
            return None;
        }
        let side = closed.side.opposite();
        if !variant.direction.allows(side) {
            return None;
        }
        if variant.exits.reopen_cooldown_ticks > 0 {
            self.pending_reopen = Some((side, variant.exits.reopen_cooldown_ticks));
            return None;
        }
        if !input.active || input.entries_blocked {
            return None;
        }
        let pos = open_position(side, input);
        self.position = Some(pos.clone());
        Some(pos)
    }

    fn step_flat(&mut self, variant: &Variant, input: &TickInput) -> Transition {
        if let Some((side, remaining)) = self.pending_reopen.take() {
            if remaining > 1 {
                self.pending_reopen = Some((side, remaining - 1));
                return Transition::Idle;
            }
            if input.active && !input.entries_blocked {
                let pos = open_position(side, input);
                self.position = Some(pos.clone());
                return Transition::Opened(pos);
            }
            return Transition::Idle;
        }

        let Some(side) = input.signal.action.side() else {
            return Transition::Idle;
        };
        if input.signal.strength < variant.exits.activation_threshold
            || !variant.direction.allows(side)
            || !input.active
            || input.entries_blocked
            || input.notional <= 0.0
        {
            return Transition::Idle;
        }

        let pos = open_position(side, input);
        self.position = Some(pos.clone());
        Transition::Opened(pos)
    }
}

fn open_position(side: Side, input: &TickInput) -> Position {
    Position {
        side,
        entry_price: input.price,
        entry_ts: input.now,
        notional: input.notional,
        ticks_held: 0,
    }
}

/// First matching exit rule, in priority order.
///
/// `ticks_held` must already include the current evaluation.
pub fn exit_reason(
    params: &ExitParams,
    max_hold_ms: i64,
    pos: &Position,
    pnl_pct: f64,
    now: TimestampMs,
    signal: &SignalOutput,
) -> Option<ExitReason> {
    if pos.ticks_held < params.min_hold_ticks {
        return None;
    }
    if pnl_pct >= params.take_profit_pct {
        return Some(ExitReason::TakeProfit);
    }
    if pnl_pct <= params.stop_loss_pct {
        return Some(ExitReason::StopLoss);
    }
    if now - pos.entry_ts >= max_hold_ms {
        return Some(ExitReason::TimeLimit);
    }
    let reversed = match (pos.side, signal.action) {
        (Side::Long, Action::EnterShort) | (Side::Short, Action::EnterLong) => true,
        _ => false,
    };
    if reversed && signal.strength >= params.reversal_threshold {
        return Some(ExitReason::SignalReversal);
    }
    None
}

fn close_trade(
    variant: &Variant,
    pos: &Position,
    exit_price: f64,
    now: TimestampMs,
    pnl_pct: f64,
    reason: ExitReason,
) -> TradeRecord {
    TradeRecord {
        id: Uuid::new_v4().to_string(),
        variant_id: variant.id.clone(),
        symbol: variant.symbol.clone(),
        side: pos.side,
        entry_price: pos.entry_price,
        exit_price,
        entry_ts: pos.entry_ts,
        exit_ts: now,
        notional: pos.notional,
        pnl_pct,
        pnl_amount: pos.notional * pnl_pct / 100.0,
        holding_ms: now - pos.entry_ts,
        exit_reason: reason,
    }
}
