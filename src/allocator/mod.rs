//! Capital allocator and convergence engine
//!
//! Recomputes weights, target allocations and the active set from the
//! performance ledger:
//! - weight = clamp(1 + sensitivity × score) for variants with enough trades
//! - tiers (variants sharing a poll interval) open in order, fastest first,
//!   once every faster tier has been sampled
//! - once every tier is well sampled, cold start is over: exploration
//!   variants are retired and only the top-K systematic scorers stay active
//!
//! `plan` is a pure function of (variants, ledger); `apply` writes the result
//! back. Running it twice without new trades changes nothing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::catalog::Variant;
use crate::error::FleetError;
use crate::ledger::{PerformanceLedger, Score};
use crate::strategy::StrategyKind;
use crate::types::VariantId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Max fraction of balance committed across all active variants
    pub risk_budget: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Weight change per unit of score
    pub sensitivity: f64,
    /// Trades every faster tier needs before a slower tier opens
    pub gate_min_tier_trades: usize,
    /// Trades every tier needs before pruning to top-K
    pub convergence_min_tier_trades: usize,
    pub top_k: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            risk_budget: 0.8,
            min_weight: 0.25,
            max_weight: 2.0,
            sensitivity: 1.0,
            gate_min_tier_trades: 10,
            convergence_min_tier_trades: 30,
            top_k: 10,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if !(self.risk_budget > 0.0 && self.risk_budget <= 1.0) {
            return Err(FleetError::config("risk_budget must be within (0, 1]"));
        }
        if !(self.min_weight > 0.0 && self.min_weight <= 1.0 && 1.0 <= self.max_weight) {
            return Err(FleetError::config(format!(
                "weights must satisfy 0 < min_weight ({}) <= 1 <= max_weight ({})",
                self.min_weight, self.max_weight
            )));
        }
        if !(self.sensitivity >= 0.0 && self.sensitivity.is_finite()) {
            return Err(FleetError::config(format!(
                "sensitivity ({}) must be >= 0 so weight follows score",
                self.sensitivity
            )));
        }
        if self.top_k == 0 {
            return Err(FleetError::config("top_k must be >= 1"));
        }
        Ok(())
    }
}

/// Result of one allocator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub weights: BTreeMap<VariantId, f64>,
    pub allocations: BTreeMap<VariantId, f64>,
    pub active: BTreeSet<VariantId>,
    /// Poll intervals (ms) of the tiers currently open
    pub open_tiers: Vec<i64>,
    pub converged: bool,
    /// Why convergence did not prune this run, if it was attempted
    pub skipped: Option<String>,
}

impl AllocationReport {
    pub fn total_allocation(&self) -> f64 {
        self.allocations.values().sum()
    }
}

pub struct Allocator {
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    fn weight_for(&self, score: Score) -> f64 {
        match score {
            Score::Ready(s) => {
                (1.0 + self.config.sensitivity * s).clamp(self.config.min_weight, self.config.max_weight)
            }
            Score::InsufficientData { .. } => 1.0,
        }
    }

    /// Compute the next weights, allocations and active set
    pub fn plan(&self, variants: &[Variant], ledger: &PerformanceLedger) -> AllocationReport {
        // Aggregate trade counts per tier, fastest first
        let mut tier_trades: BTreeMap<i64, usize> = BTreeMap::new();
        for v in variants {
            *tier_trades.entry(v.poll_interval_ms).or_default() += ledger.trades(&v.id);
        }

        let mut open_tiers = Vec::new();
        let mut faster_sampled = true;
        for (&interval, &trades) in &tier_trades {
            if !faster_sampled {
                break;
            }
            open_tiers.push(interval);
            faster_sampled = trades >= self.config.gate_min_tier_trades;
        }
        let open: BTreeSet<i64> = open_tiers.iter().copied().collect();

        let mut active: BTreeSet<VariantId> = variants
            .iter()
            .filter(|v| open.contains(&v.poll_interval_ms))
            .map(|v| v.id.clone())
            .collect();

        let mut converged = false;
        let mut skipped = None;
        let all_sampled = !tier_trades.is_empty()
            && tier_trades
                .values()
                .all(|&t| t >= self.config.convergence_min_tier_trades);

        if all_sampled {
            // An exploration-only population has nothing to hand over to
            if variants.iter().any(|v| v.kind != StrategyKind::Exploration) {
                for v in variants.iter().filter(|v| v.kind == StrategyKind::Exploration) {
                    active.remove(&v.id);
                }
            }
            let mut ranked: Vec<(f64, &VariantId)> = variants
                .iter()
                .filter(|v| active.contains(&v.id))
                .filter_map(|v| ledger.score(&v.id).ready().ok().map(|s| (s, &v.id)))
                .collect();

            if ranked.len() < 2 {
                let reason = format!(
                    "{} variant(s) with a ready score, need at least 2",
                    ranked.len()
                );
                warn!(error = %FleetError::AllocationSkipped(reason.clone()), "[ALLOC] Convergence skipped");
                skipped = Some(reason);
            } else {
                ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
                active = ranked
                    .into_iter()
                    .take(self.config.top_k)
                    .map(|(_, id)| id.clone())
                    .collect();
                converged = true;
            }
        } else {
            debug!(tiers = ?tier_trades, "[ALLOC] Tiers under-sampled, gating only");
        }

        let mut weights = BTreeMap::new();
        let mut allocations = BTreeMap::new();
        for v in variants {
            let weight = self.weight_for(ledger.score(&v.id));
            weights.insert(v.id.clone(), weight);
            let allocation = if active.contains(&v.id) {
                v.base_fraction * weight
            } else {
                0.0
            };
            allocations.insert(v.id.clone(), allocation);
        }

        let total: f64 = allocations.values().sum();
        if total > self.config.risk_budget && total > 0.0 {
            let scale = self.config.risk_budget / total;
            for a in allocations.values_mut() {
                *a *= scale;
            }
        }

        AllocationReport {
            weights,
            allocations,
            active,
            open_tiers,
            converged,
            skipped,
        }
    }

    /// Write a plan back to the variants
    pub fn apply(&self, variants: &mut [Variant], report: &AllocationReport) {
        for v in variants.iter_mut() {
            let was_active = v.active;
            v.weight = report.weights.get(&v.id).copied().unwrap_or(1.0);
            v.allocation = report.allocations.get(&v.id).copied().unwrap_or(0.0);
            v.active = report.active.contains(&v.id);
            if was_active != v.active {
                debug!(variant = %v.id, active = v.active, "[ALLOC] Activity changed");
            }
        }
        info!(
            active = report.active.len(),
            total = variants.len(),
            open_tiers = ?report.open_tiers,
            converged = report.converged,
            committed = %format!("{:.1}%", report.total_allocation() * 100.0),
            "[ALLOC] Allocation updated"
        );
    }

    pub fn run(&self, variants: &mut [Variant], ledger: &PerformanceLedger) -> AllocationReport {
        let report = self.plan(variants, ledger);
        self.apply(variants, &report);
        report
    }
}
