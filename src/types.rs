//! Core types used throughout the fleet
//!
//! Variant identity dimensions, sides, signal actions, exit reasons and the
//! immutable trade record emitted on every close.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable variant identifier, e.g. `NVDL:5m:long_only:momentum`.
pub type VariantId = String;

/// Timestamp in milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Bar timeframe in minutes. Also determines the variant's poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(pub u32);

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        self.0
    }

    /// Poll interval in milliseconds
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.0) * 60_000
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// Which sides a variant is allowed to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionMode {
    LongOnly,
    ShortOnly,
    Both,
}

impl DirectionMode {
    pub fn allows(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (DirectionMode::Both, _)
                | (DirectionMode::LongOnly, Side::Long)
                | (DirectionMode::ShortOnly, Side::Short)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DirectionMode::LongOnly => "long_only",
            DirectionMode::ShortOnly => "short_only",
            DirectionMode::Both => "both",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long_only" | "long" => Some(DirectionMode::LongOnly),
            "short_only" | "short" => Some(DirectionMode::ShortOnly),
            "both" | "long_short" => Some(DirectionMode::Both),
            _ => None,
        }
    }
}

impl fmt::Display for DirectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Action emitted by a signal generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    EnterLong,
    EnterShort,
    Hold,
}

impl Action {
    /// The side this action would open, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::EnterLong => Some(Side::Long),
            Action::EnterShort => Some(Side::Short),
            Action::Hold => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::EnterLong => write!(f, "ENTER_LONG"),
            Action::EnterShort => write!(f, "ENTER_SHORT"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeLimit,
    SignalReversal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TimeLimit => write!(f, "TIME_LIMIT"),
            ExitReason::SignalReversal => write!(f, "SIGNAL_REVERSAL"),
        }
    }
}

/// One price observation in a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: TimestampMs,
    pub price: f64,
    /// Volume since the previous bar, when the feed reports it
    pub volume: Option<f64>,
}

/// Immutable result of one open/close cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Trade ID
    pub id: String,
    pub variant_id: VariantId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_ts: TimestampMs,
    pub exit_ts: TimestampMs,
    /// Notional committed at entry
    pub notional: f64,
    /// Leveraged P&L in percent
    pub pnl_pct: f64,
    /// P&L in account currency (notional × pnl_pct / 100)
    pub pnl_amount: f64,
    pub holding_ms: i64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_mode_permits_sides() {
        assert!(DirectionMode::LongOnly.allows(Side::Long));
        assert!(!DirectionMode::LongOnly.allows(Side::Short));
        assert!(DirectionMode::ShortOnly.allows(Side::Short));
        assert!(DirectionMode::Both.allows(Side::Long));
        assert!(DirectionMode::Both.allows(Side::Short));
    }

    #[test]
    fn direction_mode_parses_aliases() {
        assert_eq!(DirectionMode::from_str("LONG"), Some(DirectionMode::LongOnly));
        assert_eq!(DirectionMode::from_str("both"), Some(DirectionMode::Both));
        assert_eq!(DirectionMode::from_str("sideways"), None);
    }

    #[test]
    fn timeframe_interval() {
        assert_eq!(Timeframe(5).interval_ms(), 300_000);
        assert_eq!(Timeframe(15).to_string(), "15m");
    }

    #[test]
    fn exit_reason_serializes_screaming() {
        let json = serde_json::to_string(&ExitReason::TakeProfit).unwrap();
        assert_eq!(json, "\"TAKE_PROFIT\"");
    }
}
