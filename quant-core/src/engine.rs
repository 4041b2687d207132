//! C8: the reconciler and tick loop. This is the only place in the crate
//! that mutates [`crate::cache::MarketDataCache`], [`crate::tracker::OrderTracker`],
//! and [`crate::position::PositionTracker`] — every other module either
//! reads them immutably or is a pure function fed their output (§5).
//!
//! One `TickLoop` instance owns one symbol on one venue. `tick` runs the
//! fixed READ -> reconcile -> guardrail -> DECIDE -> PLAN+EXECUTE sequence
//! from §4.8; `run` wraps it in the timing/shutdown loop a binary drives.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

use quant_strategy::{
    DecisionEngine, ExecutionAction, ExecutionPlanner, FeatureEngine, Intent, OverlayConfig, ParamsOverlay, Side,
    StrategyMode, StrategyParams, StrategyState,
};

use crate::cache::MarketDataCache;
use crate::errors::{InvariantViolation, VenueError};
use crate::metrics::Metrics;
use crate::persistence::event_queue::{EventQueue, PersistedEventRecord};
use crate::position::PositionTracker;
use crate::resilience::HealthTracker;
use crate::tracker::{OrderTracker, TrackedOrder};
use crate::venue::types::{MarketEvent, PrivateEvent};
use crate::venue::VenuePort;

/// Minimum gap, per §4.8, between periodic reconcile passes.
pub const PERIODIC_RECONCILE_INTERVAL_MS: i64 = 30_000;
/// Cancel-all throttle while orders are live (§4.8, §6.3).
pub const CANCEL_ALL_MIN_INTERVAL_WITH_ORDERS_MS: i64 = 1_000;
/// Cancel-all throttle once no orders are live — much looser, since
/// calling cancel-all on an empty book does nothing useful.
pub const CANCEL_ALL_MIN_INTERVAL_WITHOUT_ORDERS_MS: i64 = 30_000;
/// How often the "no orders live" cancel-all path re-syncs open orders
/// before concluding there's really nothing to cancel.
pub const OPEN_ORDERS_DRIFT_SYNC_INTERVAL_MS: i64 = 5_000;
/// Fallback rate-limit backoff when a venue doesn't report `retry_after_ms`.
pub const DEFAULT_RATE_LIMIT_RETRY_MS: i64 = 1_000;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn new_client_order_id(now_ms: i64) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("qmm-{now_ms}-{suffix:08x}")
}

fn mode_label(mode: StrategyMode) -> &'static str {
    match mode {
        StrategyMode::Normal => "normal",
        StrategyMode::Defensive => "defensive",
        StrategyMode::Pause => "pause",
    }
}

/// External source of [`StrategyParams`] (§6.3): a remote config service,
/// a local file watch, whatever a deployment wires up. The tick loop polls
/// this on its own interval and swaps params atomically on a signature
/// change, resetting the overlay in the same beat.
#[async_trait]
pub trait ParamsSource: Send + Sync {
    async fn fetch(&self) -> Result<StrategyParams, String>;
}

/// The simplest possible `ParamsSource`: always returns the same value.
/// Useful for local runs and tests where params never change underneath
/// the loop.
pub struct StaticParamsSource(StrategyParams);

impl StaticParamsSource {
    pub fn new(params: StrategyParams) -> Self {
        Self(params)
    }
}

#[async_trait]
impl ParamsSource for StaticParamsSource {
    async fn fetch(&self) -> Result<StrategyParams, String> {
        Ok(self.0.clone())
    }
}

/// What happened on one `tick` call, surfaced for logging and tests.
/// `tick` never returns an `Err` — every venue-call failure is handled
/// inline and reflected here only as a reason code or a skip.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    SkippedInvalidData,
    EmergencyCancelAll { reason: InvariantViolation },
    Ran { mode: StrategyMode, reason_codes: Vec<String>, actions_taken: usize },
}

pub struct TickLoopConfig {
    pub exchange: String,
    pub symbol: String,
    pub tick_interval_ms: i64,
    pub params_refresh_interval_ms: i64,
    pub state_persist_interval_ms: i64,
    pub overlay: OverlayConfig,
}

pub struct TickLoop {
    cfg: TickLoopConfig,
    venue: Arc<dyn VenuePort>,
    cache: MarketDataCache,
    tracker: OrderTracker,
    position: PositionTracker,
    overlay: ParamsOverlay,
    state: StrategyState,
    params: StrategyParams,
    params_signature: String,
    last_reconcile_ms: Option<i64>,
    last_cancel_all_ms: Option<i64>,
    last_open_orders_sync_ms: Option<i64>,
    last_state_log_ms: Option<i64>,
    rate_limit_until_ms: Option<i64>,
    health: Arc<Mutex<HealthTracker>>,
    event_queue: Arc<EventQueue>,
    metrics: Arc<Metrics>,
}

impl TickLoop {
    /// `start_ms` seeds the cold-start `StrategyState` and the overlay's
    /// no-fill clock; pass the same clock the binary drives `run`/`tick`
    /// with (`now_ms()` in production, an arbitrary fixed value in tests).
    pub fn new(
        cfg: TickLoopConfig,
        venue: Arc<dyn VenuePort>,
        params: StrategyParams,
        event_queue: Arc<EventQueue>,
        metrics: Arc<Metrics>,
        health: Arc<Mutex<HealthTracker>>,
        start_ms: i64,
    ) -> Self {
        let start = start_ms;
        let params_signature = params.signature();
        Self {
            cache: MarketDataCache::new(cfg.exchange.clone(), cfg.symbol.clone()),
            tracker: OrderTracker::new(),
            position: PositionTracker::new(),
            overlay: ParamsOverlay::new(cfg.overlay, start),
            state: StrategyState::cold_start(start),
            params,
            params_signature,
            last_reconcile_ms: None,
            last_cancel_all_ms: None,
            last_open_orders_sync_ms: None,
            last_state_log_ms: None,
            rate_limit_until_ms: None,
            health,
            event_queue,
            metrics,
            venue,
            cfg,
        }
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn position(&self) -> &PositionTracker {
        &self.position
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &MarketDataCache {
        &self.cache
    }

    fn rate_limited(&self, now_ms: i64) -> bool {
        matches!(self.rate_limit_until_ms, Some(until) if now_ms < until)
    }

    fn handle_venue_error(&mut self, err: &VenueError, now_ms: i64) {
        match err {
            VenueError::RateLimit { retry_after_ms } => {
                let delay = retry_after_ms.map(|ms| ms as i64).unwrap_or(DEFAULT_RATE_LIMIT_RETRY_MS);
                self.rate_limit_until_ms = Some(now_ms + delay);
                self.metrics.rate_limit_hits_total.inc();
                warn!(delay_ms = delay, "rate limited by venue, backing off");
            }
            VenueError::Auth => {
                self.health.lock().record_auth_failure();
                tracing::error!("venue authentication failed");
            }
            other if other.is_retryable() => {
                warn!(error = %other, "retryable venue error, will retry next tick");
            }
            other => {
                tracing::error!(error = %other, "venue error");
            }
        }
    }

    fn record_venue_success(&mut self) {
        self.health.lock().record_auth_success();
    }

    /// Applies one normalized market-data event (§6.1). Clears the cache
    /// on a forced reconnect so the next BBO starts from a clean slate
    /// rather than mixing pre- and post-reconnect state.
    pub fn apply_market_event(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::Reconnecting { reason } => {
                warn!(reason = %reason, "market data reconnecting, clearing cache");
                self.cache.clear();
            }
            MarketEvent::Connected => info!("market data connected"),
            MarketEvent::Disconnected => warn!("market data disconnected"),
            _ => {}
        }
        self.cache.apply(event);
    }

    /// Applies one normalized private-stream event (§6.2): mutates the
    /// tracker and position, resets the overlay's no-fill clock on a fill,
    /// and enqueues the corresponding persisted record.
    pub fn apply_private_event(&mut self, event: &PrivateEvent, now_ms: i64) {
        match event {
            PrivateEvent::Fill { client_order_id, side, price, size, fee, liquidity, exchange_order_id } => {
                self.tracker.apply_private_event(event);
                self.position.apply_fill(*side, *price, *size, now_ms);
                self.overlay.on_fill(now_ms);
                self.event_queue.enqueue(PersistedEventRecord::FillEvent {
                    ts_ms: now_ms,
                    symbol: self.cfg.symbol.clone(),
                    client_order_id: client_order_id.clone(),
                    exchange_order_id: Some(exchange_order_id.clone()),
                    side: *side,
                    price: *price,
                    size: *size,
                    fee: *fee,
                    liquidity: *liquidity,
                    mode: self.state.mode,
                    params_signature: self.params_signature.clone(),
                });
            }
            PrivateEvent::OrderUpdate { client_order_id, exchange_order_id, status, .. } => {
                let side = self
                    .tracker
                    .active_orders()
                    .iter()
                    .find(|o| &o.client_order_id == client_order_id)
                    .map(|o| o.side);
                self.tracker.apply_private_event(event);
                self.event_queue.enqueue(PersistedEventRecord::OrderEvent {
                    ts_ms: now_ms,
                    symbol: self.cfg.symbol.clone(),
                    client_order_id: client_order_id.clone(),
                    exchange_order_id: exchange_order_id.clone(),
                    side,
                    status: format!("{status:?}").to_lowercase(),
                    mode: self.state.mode,
                    params_signature: self.params_signature.clone(),
                });
            }
        }
    }

    /// Step 2 of §4.8: pulls venue-truth open orders and position,
    /// resyncing the tracker whenever the two disagree. Skips entirely
    /// while rate-limited.
    async fn reconcile(&mut self, now_ms: i64) {
        if self.rate_limited(now_ms) {
            return;
        }

        match self.venue.get_open_orders(&self.cfg.symbol).await {
            Ok(open_orders) => {
                self.record_venue_success();
                let tracked: HashSet<&str> =
                    self.tracker.active_orders().iter().filter_map(|o| o.exchange_order_id.as_deref()).collect();
                let venue_ids: HashSet<&str> = open_orders.iter().map(|o| o.exchange_order_id.as_str()).collect();
                if tracked != venue_ids {
                    self.metrics.drift_detected_total.inc();
                    warn!(?tracked, ?venue_ids, "order tracker drift detected, resyncing from venue truth");
                    self.tracker.sync_from_venue(&open_orders);
                }
                self.last_open_orders_sync_ms = Some(now_ms);
            }
            Err(err) => self.handle_venue_error(&err, now_ms),
        }

        match self.venue.get_position(&self.cfg.symbol).await {
            Ok(position) => {
                self.record_venue_success();
                self.position.sync_from_venue(position, now_ms);
            }
            Err(err) => self.handle_venue_error(&err, now_ms),
        }

        self.last_reconcile_ms = Some(now_ms);
        self.health.lock().record_reconcile(now_ms);
        self.metrics.reconciles_total.inc();
    }

    /// Issues cancel-all unconditionally, bypassing the throttle — used
    /// only by the safety guardrail and final shutdown (§4.8, §7).
    async fn dispatch_cancel_all(&mut self, now_ms: i64) {
        if self.rate_limited(now_ms) {
            return;
        }
        match self.venue.cancel_all(&self.cfg.symbol).await {
            Ok(()) => {
                self.record_venue_success();
                self.tracker.clear();
                self.metrics.cancel_all_total.inc();
            }
            Err(err) => self.handle_venue_error(&err, now_ms),
        }
        self.last_cancel_all_ms = Some(now_ms);
    }

    /// Throttled cancel-all for plan-driven intents (Pause, stale data):
    /// at most once per `CANCEL_ALL_MIN_INTERVAL_WITH/WITHOUT_ORDERS_MS`
    /// depending on whether the tracker currently believes anything is
    /// live (§4.8, §6.3).
    async fn maybe_cancel_all(&mut self, now_ms: i64) {
        let has_orders = self.tracker.active_count() > 0;
        let min_interval =
            if has_orders { CANCEL_ALL_MIN_INTERVAL_WITH_ORDERS_MS } else { CANCEL_ALL_MIN_INTERVAL_WITHOUT_ORDERS_MS };
        let due = match self.last_cancel_all_ms {
            None => true,
            Some(last) => now_ms - last >= min_interval,
        };
        if !due {
            return;
        }

        if !has_orders {
            let sync_due = match self.last_open_orders_sync_ms {
                None => true,
                Some(last) => now_ms - last >= OPEN_ORDERS_DRIFT_SYNC_INTERVAL_MS,
            };
            if sync_due && !self.rate_limited(now_ms) {
                if let Ok(open_orders) = self.venue.get_open_orders(&self.cfg.symbol).await {
                    self.record_venue_success();
                    if !open_orders.is_empty() {
                        self.metrics.drift_detected_total.inc();
                        self.tracker.sync_from_venue(&open_orders);
                    }
                    self.last_open_orders_sync_ms = Some(now_ms);
                }
            }
            if self.tracker.active_count() == 0 {
                self.last_cancel_all_ms = Some(now_ms);
                return;
            }
        }

        self.dispatch_cancel_all(now_ms).await;
    }

    async fn execute_action(&mut self, action: ExecutionAction, now_ms: i64) {
        if self.rate_limited(now_ms) {
            return;
        }
        match action {
            ExecutionAction::CancelAll => self.maybe_cancel_all(now_ms).await,
            ExecutionAction::Place { side, price, size } => {
                let client_order_id = new_client_order_id(now_ms);
                match self.venue.place_order(&client_order_id, &self.cfg.symbol, side, price, size, true).await {
                    Ok(ack) => {
                        self.record_venue_success();
                        self.tracker.add(TrackedOrder {
                            client_order_id: client_order_id.clone(),
                            exchange_order_id: ack.exchange_order_id.clone(),
                            side,
                            price,
                            size,
                            filled_size: Decimal::ZERO,
                            created_at_ms: now_ms,
                        });
                        self.metrics.orders_placed_total.inc();
                        self.event_queue.enqueue(PersistedEventRecord::OrderEvent {
                            ts_ms: now_ms,
                            symbol: self.cfg.symbol.clone(),
                            client_order_id,
                            exchange_order_id: ack.exchange_order_id,
                            side: Some(side),
                            status: "open".to_string(),
                            mode: self.state.mode,
                            params_signature: self.params_signature.clone(),
                        });
                    }
                    Err(VenueError::PostOnlyRejected) => {
                        warn!(?side, "post-only order rejected, will replan next tick");
                    }
                    Err(err) => self.handle_venue_error(&err, now_ms),
                }
            }
            ExecutionAction::Cancel { client_order_id } => {
                let tracked = self.tracker.active_orders().iter().find(|o| o.client_order_id == client_order_id).map(
                    |o| (o.side, o.exchange_order_id.clone()),
                );
                let (side, exchange_order_id) = match tracked {
                    Some(t) => t,
                    None => return,
                };
                match self.venue.cancel_order(Some(&client_order_id), exchange_order_id.as_deref(), &self.cfg.symbol).await {
                    Ok(()) => {
                        self.record_venue_success();
                        self.tracker.remove_by_client_id(&client_order_id);
                        self.metrics.orders_cancelled_total.inc();
                        self.event_queue.enqueue(PersistedEventRecord::OrderEvent {
                            ts_ms: now_ms,
                            symbol: self.cfg.symbol.clone(),
                            client_order_id,
                            exchange_order_id,
                            side: Some(side),
                            status: "cancelled".to_string(),
                            mode: self.state.mode,
                            params_signature: self.params_signature.clone(),
                        });
                    }
                    Err(err) => self.handle_venue_error(&err, now_ms),
                }
            }
        }
    }

    fn maybe_log_state(&mut self, now_ms: i64) {
        let due = match self.last_state_log_ms {
            None => true,
            Some(last) => now_ms - last >= self.cfg.state_persist_interval_ms,
        };
        if !due {
            return;
        }
        self.last_state_log_ms = Some(now_ms);
        info!(
            mode = %self.state.mode,
            position = %self.position.size(),
            realized_pnl = %self.position.realized_pnl(),
            live_orders = self.tracker.active_count(),
            dropped_events = self.event_queue.dropped_count(),
            "strategy state snapshot",
        );
    }

    /// Runs one full tick: READ, periodic reconcile, safety guardrail,
    /// DECIDE, PLAN+EXECUTE (§4.8). Never panics and never propagates a
    /// venue error — every failure is absorbed into `TickOutcome` or a log
    /// line so the loop always reaches its next scheduled tick.
    #[instrument(skip(self), fields(symbol = %self.cfg.symbol))]
    pub async fn tick(&mut self, now_ms: i64) -> TickOutcome {
        let start = std::time::Instant::now();
        let snapshot = self.cache.get_snapshot(now_ms);
        if !snapshot.has_valid_data() {
            self.metrics.tick_duration_seconds.observe(start.elapsed().as_secs_f64());
            return TickOutcome::SkippedInvalidData;
        }

        let should_reconcile = match self.last_reconcile_ms {
            None => true,
            Some(last) => now_ms - last >= PERIODIC_RECONCILE_INTERVAL_MS,
        };
        if should_reconcile {
            self.reconcile(now_ms).await;
        }

        let bid_count = self.tracker.count_on_side(Side::Buy);
        let ask_count = self.tracker.count_on_side(Side::Sell);
        let active_count = self.tracker.active_count();
        let violation = if active_count > 2 {
            Some(InvariantViolation::TooManyLiveOrders { count: active_count })
        } else if bid_count > 1 {
            Some(InvariantViolation::TooManyLiveOrdersOnSide { side: Side::Buy, count: bid_count })
        } else if ask_count > 1 {
            Some(InvariantViolation::TooManyLiveOrdersOnSide { side: Side::Sell, count: ask_count })
        } else {
            None
        };
        if let Some(reason) = violation {
            tracing::error!(%reason, "invariant violation, issuing emergency cancel-all");
            self.dispatch_cancel_all(now_ms).await;
            self.health.lock().record_tick(now_ms);
            self.metrics.ticks_total.inc();
            self.metrics.tick_duration_seconds.observe(start.elapsed().as_secs_f64());
            return TickOutcome::EmergencyCancelAll { reason };
        }

        let trades_1s = self.cache.trades_in_window(now_ms, 1_000);
        let trades_10s = self.cache.trades_in_window(now_ms, 10_000);
        let mids_10s = self.cache.mids_in_window(now_ms, 10_000);
        let features = FeatureEngine::compute(&snapshot, &trades_1s, &trades_10s, &mids_10s, &self.params);
        if features.toxic {
            tracing::debug!(
                liq_count_10s = features.liq_count_10s,
                trade_imbalance_1s = features.trade_imbalance_1s,
                "toxic flow flag set"
            );
        }

        let effective_base = self.overlay.compute_effective_base_half_spread_bps(self.params.base_half_spread_bps, now_ms);
        let mut effective_params = self.params.clone();
        effective_params.base_half_spread_bps = effective_base;

        let decision = DecisionEngine::decide(&self.state, &snapshot, &features, &effective_params, self.position.size(), now_ms);
        let prev_mode = self.state.mode;
        let prev_last_quote_ms = self.state.last_quote_ms;
        self.state = decision.next_state;
        if self.state.mode != prev_mode {
            self.metrics.mode_transitions_total.with_label_values(&[mode_label(self.state.mode)]).inc();
        }
        if self.state.mode == StrategyMode::Pause {
            self.overlay.reset();
        }

        let mut actions_taken = 0;
        for intent in &decision.intents {
            let live_bid = self.tracker.get_bid_order().map(TrackedOrder::to_live_view);
            let live_ask = self.tracker.get_ask_order().map(TrackedOrder::to_live_view);
            let actions = ExecutionPlanner::plan(
                intent,
                live_bid.as_ref(),
                live_ask.as_ref(),
                prev_last_quote_ms,
                now_ms,
                &effective_params,
                snapshot.mid_px_f64(),
            );
            for action in actions {
                actions_taken += 1;
                self.execute_action(action, now_ms).await;
            }
        }

        self.health.lock().record_tick(now_ms);
        self.metrics.ticks_total.inc();
        self.metrics.tick_duration_seconds.observe(start.elapsed().as_secs_f64());
        self.maybe_log_state(now_ms);

        TickOutcome::Ran { mode: self.state.mode, reason_codes: decision.reason_codes, actions_taken }
    }

    async fn refresh_params(&mut self, source: &dyn ParamsSource) {
        match source.fetch().await {
            Ok(new_params) => {
                let new_signature = new_params.signature();
                if new_signature != self.params_signature {
                    info!(old = %self.params_signature, new = %new_signature, "params signature changed, swapping atomically");
                    self.overlay.reset();
                }
                self.params_signature = new_signature;
                self.params = new_params;
            }
            Err(err) => warn!(error = %err, "failed to refresh strategy params, keeping previous set"),
        }
    }

    fn drain_market_events(&mut self, rx: &mut mpsc::Receiver<MarketEvent>) {
        while let Ok(event) = rx.try_recv() {
            self.apply_market_event(&event);
        }
    }

    fn drain_private_events(&mut self, rx: &mut mpsc::Receiver<PrivateEvent>, now_ms: i64) {
        while let Ok(event) = rx.try_recv() {
            self.apply_private_event(&event, now_ms);
        }
    }

    /// Drives ticks at `tick_interval_ms`, drains queued market/private
    /// events before each one, refreshes params on its own interval, and
    /// runs the graceful-shutdown cancel-all once `shutdown` reports
    /// `true` (§6.5, §7). Never overlaps ticks: the next tick is only
    /// scheduled after the previous one (and any event draining) returns.
    pub async fn run(
        mut self,
        mut market_rx: mpsc::Receiver<MarketEvent>,
        mut private_rx: mpsc::Receiver<PrivateEvent>,
        params_source: Arc<dyn ParamsSource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let tick_interval = Duration::from_millis(self.cfg.tick_interval_ms.max(1) as u64);
        let params_interval = Duration::from_millis(self.cfg.params_refresh_interval_ms.max(1) as u64);
        let mut next_tick = tokio::time::Instant::now() + tick_interval;
        let mut next_params_refresh = tokio::time::Instant::now() + params_interval;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    next_tick = tokio::time::Instant::now() + tick_interval;
                    let now = now_ms();
                    self.drain_market_events(&mut market_rx);
                    self.drain_private_events(&mut private_rx, now);
                    self.tick(now).await;
                }
                _ = tokio::time::sleep_until(next_params_refresh) => {
                    next_params_refresh = tokio::time::Instant::now() + params_interval;
                    self.refresh_params(params_source.as_ref()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("tick loop shutting down: flushing final cancel-all");
        self.dispatch_cancel_all(now_ms()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::MockVenuePort;
    use rust_decimal_macros::dec;

    fn test_loop(venue: Arc<MockVenuePort>) -> TickLoop {
        TickLoop::new(
            TickLoopConfig {
                exchange: "test-exchange".to_string(),
                symbol: "BTC-PERP".to_string(),
                tick_interval_ms: 250,
                params_refresh_interval_ms: 5_000,
                state_persist_interval_ms: 60_000,
                overlay: OverlayConfig::default(),
            },
            venue,
            StrategyParams::default(),
            Arc::new(EventQueue::new(1_000)),
            Arc::new(Metrics::new().unwrap()),
            Arc::new(Mutex::new(HealthTracker::new())),
            0,
        )
    }

    #[tokio::test]
    async fn tick_skips_when_cache_has_no_valid_data() {
        let mut loop_ = test_loop(Arc::new(MockVenuePort::new()));
        assert_eq!(loop_.tick(1_000).await, TickOutcome::SkippedInvalidData);
    }

    #[tokio::test]
    async fn stale_snapshot_forces_pause_and_cancel_all_intent() {
        let mut loop_ = test_loop(Arc::new(MockVenuePort::new()));
        loop_.apply_market_event(&MarketEvent::Bbo {
            symbol: "BTC-PERP".to_string(),
            ts_ms: 0,
            seq: Some(1),
            best_bid_px: dec!(100),
            best_bid_sz: dec!(1),
            best_ask_px: dec!(100.1),
            best_ask_sz: dec!(1),
        });
        // stale_ms default is 5_000; ticking far past it with no newer data forces Pause.
        let outcome = loop_.tick(50_000).await;
        match outcome {
            TickOutcome::Ran { mode, reason_codes, .. } => {
                assert_eq!(mode, StrategyMode::Pause);
                assert!(reason_codes.contains(&"stale_data".to_string()));
            }
            other => panic!("expected Ran, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn normal_mode_places_both_sides_after_cold_start_clears() {
        let venue = Arc::new(MockVenuePort::new());
        let mut loop_ = test_loop(venue.clone());
        loop_.apply_market_event(&MarketEvent::Bbo {
            symbol: "BTC-PERP".to_string(),
            ts_ms: 10_000,
            seq: Some(1),
            best_bid_px: dec!(100),
            best_bid_sz: dec!(1),
            best_ask_px: dec!(100.1),
            best_ask_sz: dec!(1),
        });
        // cold-start pause clears once now_ms reaches pause_until_ms (set to start time, 0)
        let outcome = loop_.tick(10_000).await;
        match outcome {
            TickOutcome::Ran { mode, actions_taken, .. } => {
                assert_eq!(mode, StrategyMode::Normal);
                assert!(actions_taken > 0);
            }
            other => panic!("expected Ran, got {other:?}"),
        }
        assert_eq!(loop_.tracker().active_count(), 2);
    }

    #[tokio::test]
    async fn apply_private_event_fill_updates_position_and_resets_overlay() {
        let mut loop_ = test_loop(Arc::new(MockVenuePort::new()));
        loop_.tracker.add(TrackedOrder {
            client_order_id: "c1".to_string(),
            exchange_order_id: Some("ex1".to_string()),
            side: Side::Buy,
            price: dec!(100),
            size: dec!(1),
            filled_size: Decimal::ZERO,
            created_at_ms: 0,
        });
        loop_.overlay.compute_effective_base_half_spread_bps(10.0, 200_000);
        assert!(loop_.overlay.is_active());

        loop_.apply_private_event(
            &PrivateEvent::Fill {
                client_order_id: "c1".to_string(),
                exchange_order_id: "ex1".to_string(),
                side: Side::Buy,
                price: dec!(100),
                size: dec!(1),
                fee: dec!(0.01),
                liquidity: crate::venue::types::Liquidity::Maker,
            },
            1_000,
        );

        assert_eq!(loop_.position.size(), dec!(1));
        assert!(loop_.tracker().get_bid_order().is_none());
        assert!(!loop_.overlay.is_active());
        assert_eq!(loop_.event_queue.len(), 1);
    }

    #[tokio::test]
    async fn order_update_for_untracked_order_persists_unknown_side() {
        let mut loop_ = test_loop(Arc::new(MockVenuePort::new()));

        loop_.apply_private_event(
            &PrivateEvent::OrderUpdate {
                client_order_id: "stale-client-id".to_string(),
                exchange_order_id: Some("ex1".to_string()),
                status: crate::venue::types::OrderStatus::Cancelled,
                reason: None,
            },
            1_000,
        );

        let batch = loop_.event_queue.drain_batch(1);
        match &batch[0] {
            PersistedEventRecord::OrderEvent { side, .. } => assert_eq!(*side, None),
            other => panic!("expected OrderEvent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn guardrail_emergency_cancels_when_too_many_orders_live() {
        let venue = Arc::new(MockVenuePort::new());
        let mut loop_ = test_loop(venue.clone());
        loop_.apply_market_event(&MarketEvent::Bbo {
            symbol: "BTC-PERP".to_string(),
            ts_ms: 10_000,
            seq: Some(1),
            best_bid_px: dec!(100),
            best_bid_sz: dec!(1),
            best_ask_px: dec!(100.1),
            best_ask_sz: dec!(1),
        });
        // Place through the venue (not just the tracker) so the reconcile
        // pass that runs at the top of the next tick sees these as
        // venue-truth too, rather than resyncing them away as drift.
        for i in 0..3 {
            let ack = venue
                .place_order(&format!("c{i}"), "BTC-PERP", Side::Buy, dec!(100), dec!(1), true)
                .await
                .unwrap();
            loop_.tracker_mut_for_test().add(TrackedOrder {
                client_order_id: format!("c{i}"),
                exchange_order_id: ack.exchange_order_id,
                side: Side::Buy,
                price: dec!(100),
                size: dec!(1),
                filled_size: Decimal::ZERO,
                created_at_ms: 10_000,
            });
        }
        let outcome = loop_.tick(10_000).await;
        assert!(matches!(outcome, TickOutcome::EmergencyCancelAll { .. }));
        assert_eq!(loop_.tracker().active_count(), 0);
    }
}

#[cfg(test)]
impl TickLoop {
    fn tracker_mut_for_test(&mut self) -> &mut OrderTracker {
        &mut self.tracker
    }
}
