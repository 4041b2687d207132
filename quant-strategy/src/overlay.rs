//! C7: a small stateful overlay that narrows the quoted spread when fills
//! have stopped arriving, so the agent doesn't sit uncompetitively wide
//! through a quiet market. Never widens past the params-source value; the
//! tick loop resets it whenever the inputs that justified its state change
//! (a fill, a mode change to Pause, stale data, or a params signature
//! change).

/// Tunables for the tightening behaviour. Not part of `StrategyParams`'s
/// signature fields — this is the overlay's own small config, typically
/// fixed per deployment rather than hot-reloaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    pub no_fill_window_ms: i64,
    pub tighten_step_bps: f64,
    pub tighten_interval_ms: i64,
    pub min_base_half_spread_bps: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            no_fill_window_ms: 120_000,
            tighten_step_bps: 0.5,
            tighten_interval_ms: 60_000,
            min_base_half_spread_bps: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamsOverlay {
    config: OverlayConfig,
    tighten_bps: f64,
    last_tighten_at_ms: Option<i64>,
    last_fill_at_ms: Option<i64>,
    active: bool,
}

impl ParamsOverlay {
    pub fn new(config: OverlayConfig, now_ms: i64) -> Self {
        Self {
            config,
            tighten_bps: 0.0,
            last_tighten_at_ms: None,
            last_fill_at_ms: Some(now_ms),
            active: false,
        }
    }

    /// A fill arrived: the no-fill clock restarts and any accumulated
    /// tightening is dropped immediately.
    pub fn on_fill(&mut self, now_ms: i64) {
        self.tighten_bps = 0.0;
        self.last_tighten_at_ms = None;
        self.last_fill_at_ms = Some(now_ms);
        self.active = false;
    }

    /// Mode transitioned to Pause, data went stale, or the params
    /// signature changed underneath us — drop any tightening without
    /// restarting the no-fill clock from a fill.
    pub fn reset(&mut self) {
        self.tighten_bps = 0.0;
        self.last_tighten_at_ms = None;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the half-spread to actually quote this tick, narrowing
    /// `db_base_half_spread_bps` by at most `tighten_step_bps` per
    /// `tighten_interval_ms` once `no_fill_window_ms` has elapsed since the
    /// last fill, floored at `min_base_half_spread_bps` and never exceeding
    /// the source value.
    pub fn compute_effective_base_half_spread_bps(&mut self, db_base_half_spread_bps: f64, now_ms: i64) -> f64 {
        let since_fill = match self.last_fill_at_ms {
            Some(t) => now_ms - t,
            None => i64::MAX,
        };

        if since_fill >= self.config.no_fill_window_ms {
            let can_tighten = match self.last_tighten_at_ms {
                None => true,
                Some(t) => now_ms - t >= self.config.tighten_interval_ms,
            };
            if can_tighten {
                self.tighten_bps += self.config.tighten_step_bps;
                self.last_tighten_at_ms = Some(now_ms);
                self.active = true;
            }
        }

        let effective = (db_base_half_spread_bps - self.tighten_bps).max(self.config.min_base_half_spread_bps);
        effective.min(db_base_half_spread_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tightens_once_per_interval_after_no_fill_window() {
        let config = OverlayConfig {
            no_fill_window_ms: 1_000,
            tighten_step_bps: 1.0,
            tighten_interval_ms: 60_000,
            min_base_half_spread_bps: 5.0,
        };
        let mut overlay = ParamsOverlay::new(config, 0);
        overlay.on_fill(0);
        let effective = overlay.compute_effective_base_half_spread_bps(10.0, 1_100);
        assert_relative_eq!(effective, 9.0);
    }

    #[test]
    fn fill_resets_tightening_immediately() {
        let config = OverlayConfig {
            no_fill_window_ms: 1_000,
            tighten_step_bps: 1.0,
            tighten_interval_ms: 60_000,
            min_base_half_spread_bps: 5.0,
        };
        let mut overlay = ParamsOverlay::new(config, 0);
        overlay.on_fill(0);
        let _ = overlay.compute_effective_base_half_spread_bps(10.0, 1_100);
        overlay.on_fill(1_500);
        let effective = overlay.compute_effective_base_half_spread_bps(10.0, 1_500);
        assert_relative_eq!(effective, 10.0);
    }

    #[test]
    fn never_tightens_past_floor() {
        let config = OverlayConfig {
            no_fill_window_ms: 0,
            tighten_step_bps: 100.0,
            tighten_interval_ms: 0,
            min_base_half_spread_bps: 5.0,
        };
        let mut overlay = ParamsOverlay::new(config, 0);
        let effective = overlay.compute_effective_base_half_spread_bps(10.0, 10);
        assert_relative_eq!(effective, 5.0);
    }

    #[test]
    fn never_exceeds_source_value() {
        let config = OverlayConfig::default();
        let mut overlay = ParamsOverlay::new(config, 0);
        overlay.on_fill(0);
        let effective = overlay.compute_effective_base_half_spread_bps(10.0, 1);
        assert_relative_eq!(effective, 10.0);
    }
}
