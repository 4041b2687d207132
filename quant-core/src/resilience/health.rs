//! Health probe (§4.9, §7): a small derived status the process exposes so
//! an external supervisor can decide whether to restart it. Never
//! rendered by the core itself — no dashboard, just the computed enum.

/// Overall process health, derived each time it's queried rather than
/// stored as a separate mutable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub max_tick_age_ms: i64,
    pub max_reconcile_age_ms: i64,
    pub auth_failure_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_tick_age_ms: 5_000,
            max_reconcile_age_ms: 120_000,
            auth_failure_threshold: 5,
        }
    }
}

/// Tracks the inputs the health probe needs. Mutated by the tick loop on
/// each tick/reconcile/venue-call outcome; read by the health endpoint.
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    last_tick_at_ms: Option<i64>,
    last_reconcile_at_ms: Option<i64>,
    consecutive_auth_failures: u32,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self, now_ms: i64) {
        self.last_tick_at_ms = Some(now_ms);
    }

    pub fn record_reconcile(&mut self, now_ms: i64) {
        self.last_reconcile_at_ms = Some(now_ms);
    }

    /// A persistent auth error (consecutive failures at/past the
    /// threshold) is what surfaces `Unhealthy`; any other success resets
    /// the counter.
    pub fn record_auth_failure(&mut self) {
        self.consecutive_auth_failures += 1;
    }

    pub fn record_auth_success(&mut self) {
        self.consecutive_auth_failures = 0;
    }

    pub fn status(&self, now_ms: i64, thresholds: &HealthThresholds) -> HealthStatus {
        if self.consecutive_auth_failures >= thresholds.auth_failure_threshold {
            return HealthStatus::Unhealthy;
        }

        let tick_age = self.last_tick_at_ms.map(|t| now_ms - t);
        let reconcile_age = self.last_reconcile_at_ms.map(|t| now_ms - t);

        match (tick_age, reconcile_age) {
            (None, _) => HealthStatus::Degraded,
            (Some(t), _) if t > thresholds.max_tick_age_ms => HealthStatus::Unhealthy,
            (_, Some(r)) if r > thresholds.max_reconcile_age_ms => HealthStatus::Degraded,
            _ => HealthStatus::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_auth_failures_mark_unhealthy() {
        let mut tracker = HealthTracker::new();
        tracker.record_tick(0);
        let thresholds = HealthThresholds { auth_failure_threshold: 3, ..HealthThresholds::default() };
        for _ in 0..3 {
            tracker.record_auth_failure();
        }
        assert_eq!(tracker.status(0, &thresholds), HealthStatus::Unhealthy);
    }

    #[test]
    fn a_success_resets_the_auth_failure_counter() {
        let mut tracker = HealthTracker::new();
        tracker.record_tick(0);
        let thresholds = HealthThresholds { auth_failure_threshold: 3, ..HealthThresholds::default() };
        tracker.record_auth_failure();
        tracker.record_auth_failure();
        tracker.record_auth_success();
        assert_eq!(tracker.status(0, &thresholds), HealthStatus::Ok);
    }

    #[test]
    fn stale_tick_marks_unhealthy() {
        let mut tracker = HealthTracker::new();
        tracker.record_tick(0);
        let thresholds = HealthThresholds::default();
        assert_eq!(tracker.status(thresholds.max_tick_age_ms + 1, &thresholds), HealthStatus::Unhealthy);
    }

    #[test]
    fn no_tick_yet_is_degraded_not_unhealthy() {
        let tracker = HealthTracker::new();
        let thresholds = HealthThresholds::default();
        assert_eq!(tracker.status(0, &thresholds), HealthStatus::Degraded);
    }
}
