//! FleetBot - paper-trading variant fleet
//!
//! Wires config, logging, the market feed and the tick loop.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleetbot::catalog::create_population;
use fleetbot::config::{AppConfig, FeedMode};
use fleetbot::engine::{Fleet, SnapshotSink, VariantEvent};
use fleetbot::feed::{HttpQuoteFeed, MarketFeed, ReplayFeed, ResilientFeed};
use fleetbot::persistence::{StateStore, TradeLog};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_http_feed(cfg: &AppConfig) -> Result<Arc<dyn MarketFeed>> {
    let mut endpoints: Vec<Arc<dyn MarketFeed>> = Vec::new();
    for url in &cfg.feed.endpoints {
        let feed = HttpQuoteFeed::new(
            url.clone(),
            cfg.feed.price_field.clone(),
            cfg.feed.volume_field.clone(),
            Duration::from_millis(cfg.feed.request_timeout_ms),
            Duration::from_millis(cfg.feed.min_request_interval_ms),
        )
        .with_context(|| format!("Failed to create HTTP feed for {}", url))?;
        endpoints.push(Arc::new(feed));
    }
    Ok(Arc::new(ResilientFeed::new(
        endpoints,
        cfg.feed.retry_policy(),
        cfg.feed.max_stale_ms,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = AppConfig::load().context("Failed to load configuration")?;
    cfg.validate().context("Invalid configuration")?;
    info!(config = %cfg.digest(), "🚀 FleetBot starting");

    let population = cfg.population()?;
    let variants = create_population(
        &population.symbols,
        &population.timeframes,
        &population.directions,
        &population.strategies,
        &cfg.variant_defaults()?,
    )?;
    info!(variants = variants.len(), "Population created");

    let replay = match cfg.feed.mode {
        FeedMode::Replay => {
            let path = cfg
                .feed
                .replay_file
                .as_deref()
                .context("feed.replay_file is required for replay mode")?;
            Some(Arc::new(
                ReplayFeed::from_path(path).with_context(|| format!("Failed to read {}", path))?,
            ))
        }
        FeedMode::Http => None,
    };
    let feed: Arc<dyn MarketFeed> = match &replay {
        Some(r) => r.clone() as Arc<dyn MarketFeed>,
        None => build_http_feed(&cfg)?,
    };

    let sink: SnapshotSink = Arc::new(tokio::sync::RwLock::new(None));
    let trade_log = TradeLog::open(cfg.persistence.trade_log_path())
        .context("Failed to open trade log")?;
    let mut fleet = Fleet::new(variants, feed, cfg.fleet_settings())?
        .with_state_store(StateStore::new(cfg.persistence.state_path()))
        .with_trade_log(trade_log)
        .with_snapshot_file(cfg.persistence.snapshot_path())
        .with_snapshot_sink(sink.clone());
    let restored = fleet.restore();
    info!(restored, "Fleet ready");

    #[cfg(feature = "dashboard")]
    if cfg.dashboard.enabled {
        let bind = cfg.dashboard.bind_addr.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            if let Err(e) = fleetbot::dashboard::serve(&bind, sink).await {
                tracing::error!(error = %e, "Dashboard stopped");
            }
        });
    }
    #[cfg(not(feature = "dashboard"))]
    if cfg.dashboard.enabled {
        warn!("dashboard.enabled is set but the binary was built without the `dashboard` feature");
    }

    match replay {
        Some(replay) => run_replay(&mut fleet, &replay, cfg.engine.tick_interval_ms as i64).await,
        None => run_live(&mut fleet, cfg.engine.tick_interval_ms).await,
    }

    let now = Utc::now().timestamp_millis();
    fleet.persist(now);
    info!(
        balance = %format!("${:.2}", fleet.portfolio().balance),
        trades = fleet.portfolio().closed_trades,
        "👋 FleetBot stopped"
    );
    Ok(())
}

async fn run_live(fleet: &mut Fleet, tick_interval_ms: u64) {
    let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                fleet.tick(Utc::now().timestamp_millis()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}

/// Synthetic clock: starts at the first replay row and advances one tick
/// interval per step until the file is consumed.
async fn run_replay(fleet: &mut Fleet, replay: &ReplayFeed, tick_interval_ms: i64) {
    let Some(mut now) = replay.first_timestamp() else {
        warn!("Replay file is empty");
        return;
    };
    let mut idle_ticks = 0u32;
    while !replay.is_exhausted() {
        let events = fleet.tick(now).await;
        // Rows left only for symbols no variant requests never drain
        let progressed = events
            .iter()
            .any(|e| !matches!(e, VariantEvent::Skipped { .. }));
        idle_ticks = if progressed { 0 } else { idle_ticks + 1 };
        if idle_ticks > 1_000 {
            warn!("Replay stalled: remaining rows belong to symbols outside the population");
            break;
        }
        now += tick_interval_ms;
    }
    info!(ticks = fleet.tick_count(), "Replay finished");
}
