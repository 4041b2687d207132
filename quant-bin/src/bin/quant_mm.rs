//! Runnable market-making agent binary: wires `RuntimeConfig`, the venue
//! adapters, the tick loop, the metrics/health server, and the
//! persisted-event flush loop together, then drives them until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quant_core::config::RuntimeConfig;
use quant_core::engine::{StaticParamsSource, TickLoop, TickLoopConfig};
use quant_core::errors::InitError;
use quant_core::metrics::server::{serve, HealthHandle};
use quant_core::persistence::{run_flush_loop, EventQueue, FileEventSink};
use quant_core::resilience::{HealthThresholds, HealthTracker};
use quant_core::venue::private_ws::WsPrivateStreamIngest;
use quant_core::venue::rest::RestVenuePort;
use quant_core::venue::ws::WsMarketDataIngest;
use quant_strategy::{OverlayConfig, StrategyParams};

/// CLI surface: everything else comes from the environment or an
/// optional TOML overlay (§4.9, §6.5).
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a TOML config file overlaying env-var defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, honored unless RUST_LOG is set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Where the event flush loop appends JSON-lines records.
    #[arg(long, default_value = "events.jsonl")]
    event_log_path: PathBuf,

    /// Capacity of the in-memory persisted-event queue before the oldest
    /// record is dropped.
    #[arg(long, default_value_t = 10_000)]
    event_queue_capacity: usize,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = RuntimeConfig::load(args.config.as_deref()).context("failed to load runtime config")?;
    info!(exchange = %cfg.exchange, symbol = %cfg.symbol, "starting quant-mm");

    let rest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| InitError::VenueClient(e.to_string()))?;
    let venue = Arc::new(RestVenuePort::new(rest_client, cfg.venue_rest_url.clone()));
    let market_ingest = WsMarketDataIngest::new(cfg.venue_ws_url.clone(), cfg.symbol.clone());
    let private_ingest = WsPrivateStreamIngest::new(cfg.venue_private_ws_url.clone(), cfg.symbol.clone());

    let metrics = Arc::new(quant_core::metrics::Metrics::new().context("registering prometheus metrics")?);
    let health_tracker = Arc::new(Mutex::new(HealthTracker::new()));
    let health_thresholds = HealthThresholds::default();
    let event_queue = Arc::new(EventQueue::new(args.event_queue_capacity));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (market_tx, market_rx) = mpsc::channel(1_024);
    let (private_tx, private_rx) = mpsc::channel(1_024);

    let metrics_addr = format!("0.0.0.0:{}", cfg.metrics_port).parse().context("invalid metrics bind address")?;
    let health_handle = HealthHandle { tracker: health_tracker.clone(), thresholds: health_thresholds };
    let metrics_task = tokio::spawn({
        let metrics = metrics.clone();
        async move {
            if let Err(err) = serve(metrics_addr, metrics, health_handle).await {
                error!(error = %err, "metrics server exited");
            }
        }
    });

    let market_task = tokio::spawn(market_ingest.run(market_tx));
    let private_task = tokio::spawn(private_ingest.run(private_tx));

    let sink = Arc::new(FileEventSink::new(args.event_log_path.clone()));
    let flush_task = tokio::spawn(run_flush_loop(
        event_queue.clone(),
        sink,
        Duration::from_millis(cfg.event_flush_interval_ms),
        shutdown_rx.clone(),
    ));

    let tick_loop = TickLoop::new(
        TickLoopConfig {
            exchange: cfg.exchange.clone(),
            symbol: cfg.symbol.clone(),
            tick_interval_ms: cfg.tick_interval_ms as i64,
            params_refresh_interval_ms: cfg.params_refresh_interval_ms as i64,
            state_persist_interval_ms: cfg.state_persist_interval_ms as i64,
            overlay: OverlayConfig::default(),
        },
        venue,
        StrategyParams::default(),
        event_queue,
        metrics,
        health_tracker,
        now_ms(),
    );
    let params_source: Arc<dyn quant_core::engine::ParamsSource> = Arc::new(StaticParamsSource::new(StrategyParams::default()));
    let tick_task = tokio::spawn(tick_loop.run(market_rx, private_rx, params_source, shutdown_rx));

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);

    if let Err(err) = tick_task.await {
        error!(error = %err, "tick loop task panicked");
    }
    if let Err(err) = flush_task.await {
        error!(error = %err, "event flush task panicked");
    }
    metrics_task.abort();
    market_task.abort();
    private_task.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    let _ = tokio::signal::ctrl_c().await;
    Ok(())
}
