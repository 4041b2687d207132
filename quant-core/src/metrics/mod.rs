//! C11: Prometheus metrics for the tick loop (§4.9, §6.5). Mirrors the
//! teacher's `monitoring` layout: one registry-owning struct here, the
//! HTTP exporter in [`server`].

pub mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Everything the tick loop increments or observes over a run. One
/// instance per process, shared behind an `Arc` with the metrics server.
pub struct Metrics {
    registry: Registry,
    pub ticks_total: IntCounter,
    pub tick_duration_seconds: Histogram,
    pub reconciles_total: IntCounter,
    pub drift_detected_total: IntCounter,
    pub rate_limit_hits_total: IntCounter,
    pub orders_placed_total: IntCounter,
    pub orders_cancelled_total: IntCounter,
    pub cancel_all_total: IntCounter,
    pub mode_transitions_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let ticks_total =
            IntCounter::with_opts(Opts::new("ticks_total", "Total tick loop iterations run").namespace("qmm"))?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("tick_duration_seconds", "Wall-clock duration of one tick")
                .namespace("qmm")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5]),
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        let reconciles_total =
            IntCounter::with_opts(Opts::new("reconciles_total", "Total reconcile passes run").namespace("qmm"))?;
        registry.register(Box::new(reconciles_total.clone()))?;

        let drift_detected_total = IntCounter::with_opts(
            Opts::new("drift_detected_total", "Total reconcile passes that found tracker/venue drift").namespace("qmm"),
        )?;
        registry.register(Box::new(drift_detected_total.clone()))?;

        let rate_limit_hits_total = IntCounter::with_opts(
            Opts::new("rate_limit_hits_total", "Total venue calls that returned a rate-limit error").namespace("qmm"),
        )?;
        registry.register(Box::new(rate_limit_hits_total.clone()))?;

        let orders_placed_total =
            IntCounter::with_opts(Opts::new("orders_placed_total", "Total orders successfully placed").namespace("qmm"))?;
        registry.register(Box::new(orders_placed_total.clone()))?;

        let orders_cancelled_total = IntCounter::with_opts(
            Opts::new("orders_cancelled_total", "Total individual orders successfully cancelled").namespace("qmm"),
        )?;
        registry.register(Box::new(orders_cancelled_total.clone()))?;

        let cancel_all_total =
            IntCounter::with_opts(Opts::new("cancel_all_total", "Total cancel-all calls issued").namespace("qmm"))?;
        registry.register(Box::new(cancel_all_total.clone()))?;

        let mode_transitions_total = IntCounterVec::new(
            Opts::new("mode_transitions_total", "Total strategy mode transitions, labeled by destination mode")
                .namespace("qmm"),
            &["to"],
        )?;
        registry.register(Box::new(mode_transitions_total.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            tick_duration_seconds,
            reconciles_total,
            drift_detected_total,
            rate_limit_hits_total,
            orders_placed_total,
            orders_cancelled_total,
            cancel_all_total,
            mode_transitions_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_metric_without_collision() {
        let metrics = Metrics::new().unwrap();
        metrics.ticks_total.inc();
        metrics.tick_duration_seconds.observe(0.01);
        metrics.mode_transitions_total.with_label_values(&["defensive"]).inc();
        assert!(!metrics.registry().gather().is_empty());
    }
}
