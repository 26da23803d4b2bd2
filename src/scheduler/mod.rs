//! Tick scheduler
//!
//! Decides which variants are due on a tick. A variant is due when its poll
//! interval has elapsed since it was last checked. Dispatch order is shortest
//! interval first, then variant id. When more variants are due than the
//! per-tick cap allows, the rest are carried over and go first next tick.

use std::collections::{HashSet, VecDeque};

use crate::catalog::Variant;
use crate::types::{TimestampMs, VariantId};

pub fn is_due(variant: &Variant, now: TimestampMs) -> bool {
    match variant.last_checked_at {
        None => true,
        Some(last) => now - last >= variant.poll_interval_ms,
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    max_dispatch_per_tick: usize,
    carry: VecDeque<VariantId>,
}

impl Scheduler {
    /// `max_dispatch_per_tick` of 0 means unbounded
    pub fn new(max_dispatch_per_tick: usize) -> Self {
        Self {
            max_dispatch_per_tick,
            carry: VecDeque::new(),
        }
    }

    pub fn carried(&self) -> usize {
        self.carry.len()
    }

    /// Variants to dispatch on this tick, in order
    pub fn plan(&mut self, now: TimestampMs, variants: &[Variant]) -> Vec<VariantId> {
        let mut seen: HashSet<VariantId> = HashSet::new();
        let mut ordered: Vec<VariantId> = Vec::new();

        for id in self.carry.drain(..) {
            if seen.insert(id.clone()) {
                ordered.push(id);
            }
        }

        let mut due: Vec<&Variant> = variants
            .iter()
            .filter(|v| is_due(v, now) && !seen.contains(&v.id))
            .collect();
        due.sort_by(|a, b| {
            a.poll_interval_ms
                .cmp(&b.poll_interval_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        for v in due {
            if seen.insert(v.id.clone()) {
                ordered.push(v.id.clone());
            }
        }

        if self.max_dispatch_per_tick > 0 && ordered.len() > self.max_dispatch_per_tick {
            let rest = ordered.split_off(self.max_dispatch_per_tick);
            self.carry.extend(rest);
        }
        ordered
    }

    /// Hand undispatched variants back for the next tick (wall-clock budget)
    pub fn carry_over(&mut self, ids: impl IntoIterator<Item = VariantId>) {
        let mut pending: Vec<VariantId> = ids.into_iter().collect();
        pending.extend(self.carry.drain(..));
        let mut seen = HashSet::new();
        self.carry = pending.into_iter().filter(|id| seen.insert(id.clone())).collect();
    }
}

/// Record a dispatch. Always `now`, never `last + interval`, so missed
/// periods are not replayed.
pub fn mark_checked(variant: &mut Variant, now: TimestampMs) {
    variant.last_checked_at = Some(now);
}
