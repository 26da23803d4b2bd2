//! Persistence
//!
//! - Fleet state as pretty JSON, written atomically (temp file, fsync, rename)
//! - Append-only CSV trade log, header written once per file

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::FleetError;
use crate::ledger::{PerformanceStats, PortfolioLedger};
use crate::lifecycle::Position;
use crate::types::{Side, TimestampMs, TradeRecord, VariantId};

pub const STATE_VERSION: u32 = 1;

/// Per-variant state re-attached by id on restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantState {
    pub stats: PerformanceStats,
    pub last_checked_at: Option<TimestampMs>,
    pub position: Option<Position>,
    /// Reopen still waiting out its cooldown
    #[serde(default)]
    pub pending_reopen: Option<(Side, u32)>,
    pub weight: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetState {
    pub version: u32,
    pub saved_at: TimestampMs,
    pub portfolio: PortfolioLedger,
    pub variants: BTreeMap<VariantId, VariantState>,
}

/// Write `bytes` to `path` via a sibling temp file so readers never see a
/// partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FleetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    Ok(())
}

/// JSON state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &FleetState) -> Result<(), FleetError> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes())?;
        info!(
            path = %self.path.display(),
            variants = state.variants.len(),
            balance = %format!("${:.2}", state.portfolio.balance),
            "💾 [FLEET] State saved"
        );
        Ok(())
    }

    /// `Ok(None)` when no state file exists yet
    pub fn load(&self) -> Result<Option<FleetState>, FleetError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "💾 [FLEET] No state file found, starting fresh");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        let state: FleetState = serde_json::from_str(&json)?;
        if state.version != STATE_VERSION {
            warn!(
                found = state.version,
                expected = STATE_VERSION,
                "State file version differs, loading anyway"
            );
        }
        info!(
            path = %self.path.display(),
            variants = state.variants.len(),
            balance = %format!("${:.2}", state.portfolio.balance),
            trades = state.portfolio.closed_trades,
            "💾 [FLEET] State loaded"
        );
        Ok(Some(state))
    }
}

/// Append-only trade log
pub struct TradeLog {
    path: PathBuf,
    writer: csv::Writer<fs::File>,
}

impl TradeLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FleetError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_has_data = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, trade: &TradeRecord) -> Result<(), FleetError> {
        self.writer.serialize(trade)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read every trade in a log file
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>, FleetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut trades = Vec::new();
        for row in reader.deserialize() {
            trades.push(row?);
        }
        Ok(trades)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// Fresh per-test directory under the system temp dir
    pub fn temp_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fleetbot-{}-{}-{}",
            name,
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
