//! `StrategyParams`: the externally-decided knobs the decision engine and
//! planner consume. This crate never fetches or refreshes params itself —
//! that's the tick loop's job (`quant_core::engine`); it only defines the
//! schema and the change-detection signature.

use serde::{Deserialize, Serialize};

/// Recognized parameter set. Replaced atomically between ticks by the
/// caller; every field here is read, never mutated, by C4-C7.
///
/// The first ten fields are the *signature* fields (§6.3): their
/// pipe-joined stringification is what [`StrategyParams::signature`]
/// hashes change detection against. Every field after `pause_liq_count_10s`
/// is a supplemental operational knob a deployable params source needs but
/// that does not participate in signature comparison — changing only a
/// supplemental knob does not bump the params-set id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    // --- signature fields (exactly these ten, in this order) ---
    pub base_half_spread_bps: f64,
    pub vol_spread_gain: f64,
    pub tox_spread_gain: f64,
    pub quote_size_usd: f64,
    pub refresh_interval_ms: i64,
    pub stale_cancel_ms: i64,
    pub max_inventory: f64,
    pub inventory_skew_gain: f64,
    pub pause_mark_index_bps: f64,
    pub pause_liq_count_10s: u32,

    // --- supplemental knobs (not part of the signature) ---
    pub stale_ms: i64,
    pub wide_spread_cutoff_bps: f64,
    pub pause_linger_ms: i64,
    pub defensive_vol_threshold: f64,
    pub defensive_imbalance_threshold: f64,
    pub tolerance: f64,
    pub tox_imbalance_threshold: f64,
    pub lot_step: f64,
    pub defensive_dwell_ms: i64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            base_half_spread_bps: 10.0,
            vol_spread_gain: 1.0,
            tox_spread_gain: 5.0,
            quote_size_usd: 100.0,
            refresh_interval_ms: 2_000,
            stale_cancel_ms: 10_000,
            max_inventory: 1_000.0,
            inventory_skew_gain: 2.0,
            pause_mark_index_bps: 50.0,
            pause_liq_count_10s: 3,

            stale_ms: 5_000,
            wide_spread_cutoff_bps: 100.0,
            pause_linger_ms: 5_000,
            defensive_vol_threshold: 0.5,
            defensive_imbalance_threshold: 0.6,
            tolerance: 1.0,
            tox_imbalance_threshold: 0.3,
            lot_step: 0.001,
            defensive_dwell_ms: 0,
        }
    }
}

impl StrategyParams {
    /// Pipe-joined stringification of the ten signature fields, in the
    /// fixed order §6.3 defines. Two params sets that agree on these ten
    /// fields always produce an identical signature, regardless of any
    /// supplemental knob's value.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.base_half_spread_bps,
            self.vol_spread_gain,
            self.tox_spread_gain,
            self.quote_size_usd,
            self.refresh_interval_ms,
            self.stale_cancel_ms,
            self.max_inventory,
            self.inventory_skew_gain,
            self.pause_mark_index_bps,
            self.pause_liq_count_10s,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_supplemental_knobs() {
        let mut a = StrategyParams::default();
        let mut b = StrategyParams::default();
        b.stale_ms = 9_999;
        b.lot_step = 0.5;
        b.defensive_dwell_ms = 500;
        assert_eq!(a.signature(), b.signature());

        a.base_half_spread_bps = 12.0;
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn signature_distinguishes_each_field() {
        let base = StrategyParams::default();
        let variants: Vec<StrategyParams> = vec![
            StrategyParams { vol_spread_gain: 2.0, ..base.clone() },
            StrategyParams { tox_spread_gain: 2.0, ..base.clone() },
            StrategyParams { quote_size_usd: 2.0, ..base.clone() },
            StrategyParams { refresh_interval_ms: 2, ..base.clone() },
            StrategyParams { stale_cancel_ms: 2, ..base.clone() },
            StrategyParams { max_inventory: 2.0, ..base.clone() },
            StrategyParams { inventory_skew_gain: 2.0, ..base.clone() },
            StrategyParams { pause_mark_index_bps: 2.0, ..base.clone() },
            StrategyParams { pause_liq_count_10s: 99, ..base.clone() },
        ];
        for v in variants {
            assert_ne!(base.signature(), v.signature());
        }
    }
}
