//! Fleet engine - runs one tick of the whole population
//!
//! Per tick:
//! 1. Scheduler picks the due variants (carried-over ones first)
//! 2. Every needed symbol (plus declared pairs) is fetched once, concurrently
//! 3. Each processed variant: window update → signal → lifecycle step
//! 4. On close: portfolio ledger, then performance ledger, then trade log
//! 5. Allocator every N ticks, state + snapshot every M ticks, dashboard every K

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::allocator::{AllocationReport, Allocator, AllocatorConfig};
use crate::catalog::Variant;
use crate::error::{FeedError, FleetError};
use crate::feed::{MarketFeed, PriceWindows, Quote};
use crate::ledger::portfolio::PortfolioConfig;
use crate::ledger::{PerformanceLedger, PortfolioLedger, ScoringConfig};
use crate::lifecycle::{Lifecycle, TickInput, Transition};
use crate::persistence::{write_atomic, FleetState, StateStore, TradeLog, VariantState, STATE_VERSION};
use crate::report::{self, FleetSnapshot, PositionSnapshot, VariantSnapshot};
use crate::scheduler::{mark_checked, Scheduler};
use crate::strategy;
use crate::types::{Action, Side, TimestampMs, TradeRecord, VariantId};

const RECENT_TRADES: usize = 200;

/// Tick loop cadence and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub allocator_every_ticks: u64,
    pub snapshot_every_ticks: u64,
    pub dashboard_every_ticks: u64,
    /// 0 = unbounded
    pub max_dispatch_per_tick: usize,
    /// Wall-clock budget for processing a tick (0 = unbounded)
    pub tick_budget_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Bars kept per (symbol, timeframe)
    pub window_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            allocator_every_ticks: 10,
            snapshot_every_ticks: 1,
            dashboard_every_ticks: 30,
            max_dispatch_per_tick: 0,
            tick_budget_ms: 45_000,
            fetch_timeout_ms: 25_000,
            window_capacity: 200,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.tick_interval_ms == 0 || self.fetch_timeout_ms == 0 {
            return Err(FleetError::config(
                "tick_interval_ms and fetch_timeout_ms must be > 0",
            ));
        }
        if self.allocator_every_ticks == 0
            || self.snapshot_every_ticks == 0
            || self.dashboard_every_ticks == 0
        {
            return Err(FleetError::config("*_every_ticks cadences must be >= 1"));
        }
        Ok(())
    }
}

/// Everything the engine needs besides the population and the feed
#[derive(Debug, Clone, Default)]
pub struct FleetSettings {
    pub engine: EngineConfig,
    pub scoring: ScoringConfig,
    pub allocator: AllocatorConfig,
    pub portfolio: PortfolioConfig,
}

/// Outcome of one variant on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum VariantEvent {
    Opened {
        variant_id: VariantId,
        side: Side,
        price: f64,
        strength: f64,
        notional: f64,
    },
    Held {
        variant_id: VariantId,
        pnl_pct: f64,
    },
    Closed {
        trade: TradeRecord,
        reopened: Option<Side>,
    },
    Idle {
        variant_id: VariantId,
        action: Action,
        strength: f64,
    },
    /// No usable price; retried next tick
    Skipped { variant_id: VariantId, reason: String },
    /// Not reached within the tick budget; dispatched first next tick
    Deferred { variant_id: VariantId },
}

impl VariantEvent {
    pub fn variant_id(&self) -> &str {
        match self {
            VariantEvent::Opened { variant_id, .. }
            | VariantEvent::Held { variant_id, .. }
            | VariantEvent::Idle { variant_id, .. }
            | VariantEvent::Skipped { variant_id, .. }
            | VariantEvent::Deferred { variant_id } => variant_id,
            VariantEvent::Closed { trade, .. } => &trade.variant_id,
        }
    }
}

pub type SnapshotSink = Arc<RwLock<Option<FleetSnapshot>>>;

pub struct Fleet {
    variants: Vec<Variant>,
    lifecycles: Vec<Lifecycle>,
    index: HashMap<VariantId, usize>,
    ledger: PerformanceLedger,
    portfolio: PortfolioLedger,
    allocator: Allocator,
    scheduler: Scheduler,
    windows: PriceWindows,
    feed: Arc<dyn MarketFeed>,
    settings: FleetSettings,
    tick_count: u64,
    last_marks: HashMap<String, f64>,
    recent_trades: VecDeque<TradeRecord>,
    state_store: Option<StateStore>,
    trade_log: Option<TradeLog>,
    snapshot_file: Option<PathBuf>,
    snapshot_sink: Option<SnapshotSink>,
}

impl Fleet {
    pub fn new(
        variants: Vec<Variant>,
        feed: Arc<dyn MarketFeed>,
        settings: FleetSettings,
    ) -> Result<Self, FleetError> {
        if variants.is_empty() {
            return Err(FleetError::config("population is empty"));
        }
        settings.engine.validate()?;
        settings.scoring.validate()?;
        settings.allocator.validate()?;
        settings.portfolio.validate()?;

        let required = variants
            .iter()
            .map(|v| v.kind.generator().min_lookback(&v.signal))
            .max()
            .unwrap_or(1);
        if settings.engine.window_capacity < required {
            return Err(FleetError::config(format!(
                "window_capacity ({}) is below the longest lookback ({})",
                settings.engine.window_capacity, required
            )));
        }

        let index = variants
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.clone(), i))
            .collect();

        Ok(Self {
            lifecycles: vec![Lifecycle::default(); variants.len()],
            index,
            ledger: PerformanceLedger::new(settings.scoring.clone()),
            portfolio: PortfolioLedger::new(settings.portfolio.initial_capital),
            allocator: Allocator::new(settings.allocator.clone()),
            scheduler: Scheduler::new(settings.engine.max_dispatch_per_tick),
            windows: PriceWindows::new(settings.engine.window_capacity),
            variants,
            feed,
            settings,
            tick_count: 0,
            last_marks: HashMap::new(),
            recent_trades: VecDeque::new(),
            state_store: None,
            trade_log: None,
            snapshot_file: None,
            snapshot_sink: None,
        })
    }

    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn with_trade_log(mut self, log: TradeLog) -> Self {
        self.trade_log = Some(log);
        self
    }

    pub fn with_snapshot_file(mut self, path: PathBuf) -> Self {
        self.snapshot_file = Some(path);
        self
    }

    pub fn with_snapshot_sink(mut self, sink: SnapshotSink) -> Self {
        self.snapshot_sink = Some(sink);
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, id: &str) -> Option<&Variant> {
        self.index.get(id).map(|&i| &self.variants[i])
    }

    pub fn lifecycle(&self, id: &str) -> Option<&Lifecycle> {
        self.index.get(id).map(|&i| &self.lifecycles[i])
    }

    pub fn ledger(&self) -> &PerformanceLedger {
        &self.ledger
    }

    pub fn portfolio(&self) -> &PortfolioLedger {
        &self.portfolio
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn recent_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.recent_trades.iter()
    }

    pub fn open_positions(&self) -> usize {
        self.lifecycles.iter().filter(|l| l.is_open()).count()
    }

    // ── Startup ──────────────────────────────────────────────────

    /// Re-attach persisted state by variant id, then run the allocator once.
    /// Returns the number of variants restored. A missing or unreadable state
    /// file starts the fleet fresh.
    pub fn restore(&mut self) -> usize {
        let mut restored = 0;
        let loaded = match &self.state_store {
            Some(store) => store.load(),
            None => Ok(None),
        };
        match loaded {
            Ok(Some(state)) => {
                restored = self.import_state(state);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to load fleet state, starting fresh");
            }
        }
        self.rebalance();
        restored
    }

    fn import_state(&mut self, state: FleetState) -> usize {
        let mut restored = 0;
        for (id, vs) in state.variants {
            let Some(&i) = self.index.get(&id) else {
                warn!(variant = %id, "Ignoring persisted state for unknown variant");
                continue;
            };
            let variant = &mut self.variants[i];
            variant.last_checked_at = vs.last_checked_at;
            variant.weight = vs.weight;
            variant.active = vs.active;
            self.lifecycles[i] = Lifecycle::restore(vs.position, vs.pending_reopen);
            self.ledger.restore(id, vs.stats);
            restored += 1;
        }
        self.portfolio = state.portfolio;
        info!(
            restored,
            open_positions = self.open_positions(),
            balance = %format!("${:.2}", self.portfolio.balance),
            "[FLEET] State re-attached"
        );
        restored
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Fetch each symbol once, concurrently, each under the fetch timeout
    async fn fetch_all(&self, symbols: BTreeSet<String>) -> HashMap<String, Result<Quote, FeedError>> {
        let timeout = Duration::from_millis(self.settings.engine.fetch_timeout_ms);
        let fetches = symbols.into_iter().map(|symbol| {
            let feed = Arc::clone(&self.feed);
            async move {
                let result = match tokio::time::timeout(timeout, feed.get_price(&symbol)).await {
                    Ok(r) => r,
                    Err(_) => Err(FeedError::Timeout),
                };
                (symbol, result)
            }
        });
        join_all(fetches).await.into_iter().collect()
    }

    /// Run one tick at time `now`
    pub async fn tick(&mut self, now: TimestampMs) -> Vec<VariantEvent> {
        self.tick_count += 1;
        let started = Instant::now();
        let plan = self.scheduler.plan(now, &self.variants);

        let mut symbols = BTreeSet::new();
        for id in &plan {
            if let Some(&i) = self.index.get(id) {
                symbols.insert(self.variants[i].symbol.clone());
                if let Some(pair) = &self.variants[i].pair {
                    symbols.insert(pair.clone());
                }
            }
        }

        let fetched = !symbols.is_empty();
        let quotes = self.fetch_all(symbols).await;
        let mut any_ok = false;
        for (symbol, result) in &quotes {
            match result {
                Ok(q) => {
                    any_ok = true;
                    self.last_marks.insert(symbol.clone(), q.price);
                }
                Err(e) => {
                    warn!(error = %e.clone().into_fleet(symbol), "[FEED] Quote unavailable");
                }
            }
        }

        let budget = match self.settings.engine.tick_budget_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let mut events = Vec::with_capacity(plan.len());
        for (pos, id) in plan.iter().enumerate() {
            if budget.map(|b| started.elapsed() > b).unwrap_or(false) {
                let rest: Vec<VariantId> = plan[pos..].to_vec();
                warn!(deferred = rest.len(), "[FLEET] Tick budget exhausted, carrying over");
                events.extend(rest.iter().map(|id| VariantEvent::Deferred {
                    variant_id: id.clone(),
                }));
                self.scheduler.carry_over(rest);
                break;
            }
            let Some(&i) = self.index.get(id) else { continue };
            self.advance_windows(i, now, &quotes);
            events.push(self.process_variant(i, now, &quotes));
        }

        if self.tick_count % self.settings.engine.allocator_every_ticks == 0 {
            self.rebalance();
        }

        if fetched && !any_ok {
            warn!(tick = self.tick_count, "[FLEET] Every fetch failed, keeping last saved state");
        } else if self.tick_count % self.settings.engine.snapshot_every_ticks == 0 {
            self.persist(now);
        }

        if self.tick_count % self.settings.engine.dashboard_every_ticks == 0 {
            report::log_dashboard(&self.snapshot(now));
        }

        if let Some(sink) = &self.snapshot_sink {
            let snapshot = self.snapshot(now);
            *sink.write().await = Some(snapshot);
        }

        events
    }

    /// Feed this tick's quote into the variant's own and paired windows.
    /// Only variants that are actually processed advance a window, and a
    /// window takes at most one bar per timeframe period.
    fn advance_windows(&mut self, i: usize, now: TimestampMs, quotes: &HashMap<String, Result<Quote, FeedError>>) {
        let v = &self.variants[i];
        for symbol in std::iter::once(&v.symbol).chain(v.pair.iter()) {
            if let Some(Ok(q)) = quotes.get(symbol) {
                if q.is_tradeable() {
                    let mut bar = q.to_bar();
                    bar.ts = now;
                    self.windows.advance(symbol, v.timeframe, bar);
                }
            }
        }
    }

    fn process_variant(
        &mut self,
        i: usize,
        now: TimestampMs,
        quotes: &HashMap<String, Result<Quote, FeedError>>,
    ) -> VariantEvent {
        let variant_id = self.variants[i].id.clone();
        let quote = match quotes.get(&self.variants[i].symbol) {
            Some(Ok(q)) if q.is_tradeable() => q,
            Some(Ok(_)) => {
                debug!(variant = %variant_id, "Stale quote, skipping");
                return VariantEvent::Skipped {
                    variant_id,
                    reason: "stale quote".to_string(),
                };
            }
            Some(Err(e)) => {
                return VariantEvent::Skipped {
                    variant_id,
                    reason: e.to_string(),
                };
            }
            None => {
                return VariantEvent::Skipped {
                    variant_id,
                    reason: FeedError::NoData.to_string(),
                };
            }
        };
        let price = quote.price;

        let transition = {
            let variant = &self.variants[i];
            let window = self.windows.window(&variant.symbol, variant.timeframe);
            let paired = variant
                .pair
                .as_deref()
                .map(|p| self.windows.window(p, variant.timeframe))
                .filter(|w| !w.is_empty());
            let signal = strategy::evaluate(variant, window, paired);
            let input = TickInput {
                now,
                price,
                signal,
                active: variant.active,
                entries_blocked: self.portfolio.entries_blocked(self.settings.portfolio.max_drawdown_pct),
                notional: self.portfolio.notional_for(variant.allocation),
            };
            let transition = self.lifecycles[i].step(variant, input);
            (transition, signal)
        };
        mark_checked(&mut self.variants[i], now);

        match transition {
            (Transition::Opened(pos), signal) => {
                info!(
                    variant = %variant_id,
                    side = %pos.side,
                    price = %format!("{:.4}", price),
                    strength = %format!("{:.2}", signal.strength),
                    notional = %format!("${:.2}", pos.notional),
                    "[FLEET] Position opened"
                );
                VariantEvent::Opened {
                    variant_id,
                    side: pos.side,
                    price,
                    strength: signal.strength,
                    notional: pos.notional,
                }
            }
            (Transition::Held { pnl_pct }, _) => {
                debug!(variant = %variant_id, pnl_pct = %format!("{:+.2}%", pnl_pct), "Holding");
                VariantEvent::Held { variant_id, pnl_pct }
            }
            (Transition::Closed { trade, reopened }, _) => {
                self.on_close(&trade);
                let reopened = reopened.map(|p| {
                    info!(variant = %variant_id, side = %p.side, "[FLEET] Reopened after reversal");
                    p.side
                });
                VariantEvent::Closed { trade, reopened }
            }
            (Transition::Idle, signal) => VariantEvent::Idle {
                variant_id,
                action: signal.action,
                strength: signal.strength,
            },
        }
    }

    /// Portfolio first, then performance ledger, then the trade log
    fn on_close(&mut self, trade: &TradeRecord) {
        let delta = self.portfolio.apply_close(trade);
        self.ledger.record(trade);
        if let Some(log) = self.trade_log.as_mut() {
            if let Err(e) = log.append(trade) {
                warn!(error = %e, "Failed to append trade log");
            }
        }

        let stats = self.ledger.stats(&trade.variant_id);
        info!(
            trade_id = %trade.id,
            variant = %trade.variant_id,
            side = %trade.side,
            entry_price = %format!("{:.4}", trade.entry_price),
            exit_price = %format!("{:.4}", trade.exit_price),
            pnl_pct = %format!("{:+.2}%", trade.pnl_pct),
            pnl = %format!("${:+.2}", delta),
            reason = %trade.exit_reason,
            hold_secs = trade.holding_ms / 1000,
            balance = %format!("${:.2}", self.portfolio.balance),
            trades = stats.map(|s| s.trades).unwrap_or(0),
            "[FLEET] Position closed"
        );

        self.recent_trades.push_back(trade.clone());
        while self.recent_trades.len() > RECENT_TRADES {
            self.recent_trades.pop_front();
        }
    }

    /// Recompute weights, allocations and the active set
    pub fn rebalance(&mut self) -> AllocationReport {
        self.allocator.run(&mut self.variants, &self.ledger)
    }

    // ── Snapshot / persistence ───────────────────────────────────

    pub fn snapshot(&self, now: TimestampMs) -> FleetSnapshot {
        let variants: Vec<VariantSnapshot> = self
            .variants
            .iter()
            .zip(&self.lifecycles)
            .map(|(v, lc)| {
                let stats = self.ledger.stats(&v.id);
                let position = lc.position.as_ref().map(|p| {
                    let mark = self.last_marks.get(&v.symbol).copied();
                    PositionSnapshot {
                        side: p.side,
                        entry_price: p.entry_price,
                        entry_ts: p.entry_ts,
                        notional: p.notional,
                        ticks_held: p.ticks_held,
                        mark_price: mark,
                        unrealized_pnl_pct: mark.map(|m| p.pnl_pct(m, v.leverage)),
                    }
                });
                VariantSnapshot {
                    variant_id: v.id.clone(),
                    symbol: v.symbol.clone(),
                    timeframe: v.timeframe.to_string(),
                    strategy: v.kind.label().to_string(),
                    direction: v.direction.label().to_string(),
                    active: v.active,
                    weight: v.weight,
                    allocation: v.allocation,
                    trades: stats.map(|s| s.trades).unwrap_or(0),
                    win_rate: stats.map(|s| s.win_rate()).unwrap_or(0.0),
                    avg_pnl: stats.map(|s| s.avg_pnl_pct()).unwrap_or(0.0),
                    total_profit: stats.map(|s| s.total_profit).unwrap_or(0.0),
                    last_checked_at: v.last_checked_at,
                    score: self.ledger.score(&v.id).value(),
                    position,
                }
            })
            .collect();

        FleetSnapshot {
            ts: now,
            tick: self.tick_count,
            balance: self.portfolio.balance,
            initial_capital: self.portfolio.initial_capital,
            realized_pnl: self.portfolio.realized_pnl,
            drawdown_pct: self.portfolio.drawdown_pct(),
            closed_trades: self.portfolio.closed_trades,
            open_positions: self.open_positions(),
            active_variants: self.variants.iter().filter(|v| v.active).count(),
            variants,
        }
    }

    pub fn export_state(&self, now: TimestampMs) -> FleetState {
        let variants = self
            .variants
            .iter()
            .zip(&self.lifecycles)
            .map(|(v, lc)| {
                (
                    v.id.clone(),
                    VariantState {
                        stats: self.ledger.stats(&v.id).cloned().unwrap_or_default(),
                        last_checked_at: v.last_checked_at,
                        position: lc.position.clone(),
                        pending_reopen: lc.pending_reopen,
                        weight: v.weight,
                        active: v.active,
                    },
                )
            })
            .collect();
        FleetState {
            version: STATE_VERSION,
            saved_at: now,
            portfolio: self.portfolio.clone(),
            variants,
        }
    }

    /// Save state and snapshot files. Failures are logged, never fatal.
    pub fn persist(&self, now: TimestampMs) {
        if let Some(store) = &self.state_store {
            if let Err(e) = store.save(&self.export_state(now)) {
                warn!(error = %e, "Failed to save fleet state");
            }
        }
        if let Some(path) = &self.snapshot_file {
            let written = serde_json::to_vec_pretty(&self.snapshot(now))
                .map_err(FleetError::from)
                .and_then(|bytes| write_atomic(path, &bytes));
            if let Err(e) = written {
                warn!(error = %e, path = %path.display(), "Failed to write snapshot");
            }
        }
    }
}
