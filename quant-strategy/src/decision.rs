//! C5: the NORMAL / DEFENSIVE / PAUSE state machine. Pure — every branch is
//! a function of its arguments, never a clock read or a hidden field. The
//! tick loop owns the only mutable copy of `StrategyState` and feeds the
//! previous tick's output back in as this tick's input.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::params::StrategyParams;
use crate::types::{Features, Intent, QuoteSide, Side, Snapshot, StrategyMode, StrategyState};

/// Result of one [`DecisionEngine::decide`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutput {
    pub next_state: StrategyState,
    pub intents: Vec<Intent>,
    pub reason_codes: Vec<String>,
}

pub struct DecisionEngine;

impl DecisionEngine {
    /// Evaluate the five transition rules in §4.5 order; the first match
    /// wins. `position_size` is signed: positive is long, negative short.
    pub fn decide(
        state: &StrategyState,
        snapshot: &Snapshot,
        features: &Features,
        params: &StrategyParams,
        position_size: Decimal,
        now_ms: i64,
    ) -> DecisionOutput {
        let mut reasons = Vec::new();

        let stale = now_ms - snapshot.last_update_ms > params.stale_ms;
        let wide_spread = features.spread_bps > params.wide_spread_cutoff_bps;
        let mark_index_breach = features.mark_index_div_bps.abs() >= params.pause_mark_index_bps;
        let liq_breach = features.liq_count_10s >= params.pause_liq_count_10s;

        if stale || wide_spread || mark_index_breach || liq_breach {
            if stale {
                reasons.push("stale_data".to_string());
            }
            if wide_spread {
                reasons.push("wide_spread".to_string());
            }
            if mark_index_breach {
                reasons.push("mark_index_div".to_string());
            }
            if liq_breach {
                reasons.push("liq_count".to_string());
            }
            let next_state = Self::enter_mode(state, StrategyMode::Pause, now_ms, false);
            let next_state = StrategyState {
                pause_until_ms: Some(now_ms + params.pause_linger_ms),
                ..next_state
            };
            return DecisionOutput {
                next_state,
                intents: vec![Intent::CancelAll],
                reason_codes: reasons,
            };
        }

        if state.mode == StrategyMode::Pause {
            if let Some(until) = state.pause_until_ms {
                if now_ms < until {
                    reasons.push("pause_linger".to_string());
                    return DecisionOutput {
                        next_state: state.clone(),
                        intents: vec![Intent::CancelAll],
                        reason_codes: reasons,
                    };
                }
            }
        }

        let position_f64 = position_size.to_f64().unwrap_or(0.0);
        let inventory_limit = params.max_inventory * params.tolerance;
        if position_f64.abs() >= inventory_limit {
            reasons.push("inventory_limit".to_string());
            let reducing_side = if position_f64 > 0.0 { Side::Sell } else { Side::Buy };
            let intent = Self::quote_intent(features, params, position_f64, Some(reducing_side));
            let next_state = Self::enter_mode(state, StrategyMode::Defensive, now_ms, true);
            return DecisionOutput {
                next_state,
                intents: vec![intent],
                reason_codes: reasons,
            };
        }

        let vol_trigger = features.realized_vol_10s * 10_000.0 >= params.defensive_vol_threshold;
        let imbalance_trigger = features.trade_imbalance_1s.abs() >= params.defensive_imbalance_threshold;
        if vol_trigger || imbalance_trigger {
            if vol_trigger {
                reasons.push("defensive_vol".to_string());
            }
            if imbalance_trigger {
                reasons.push("defensive_imbalance".to_string());
            }
            let intent = Self::quote_intent(features, params, position_f64, None);
            let next_state = Self::enter_mode(state, StrategyMode::Defensive, now_ms, true);
            return DecisionOutput {
                next_state,
                intents: vec![intent],
                reason_codes: reasons,
            };
        }

        // Hysteresis: Defensive holds for defensive_dwell_ms after the
        // triggering predicate clears before re-entering Normal.
        if state.mode == StrategyMode::Defensive && params.defensive_dwell_ms > 0 {
            let dwell_elapsed = now_ms - state.mode_since_ms;
            if dwell_elapsed < params.defensive_dwell_ms {
                reasons.push("defensive_dwell".to_string());
                let intent = Self::quote_intent(features, params, position_f64, None);
                let next_state = StrategyState {
                    mode: StrategyMode::Defensive,
                    mode_since_ms: state.mode_since_ms,
                    pause_until_ms: None,
                    last_quote_ms: Some(now_ms),
                };
                return DecisionOutput {
                    next_state,
                    intents: vec![intent],
                    reason_codes: reasons,
                };
            }
        }

        reasons.push("normal".to_string());
        let intent = Self::quote_intent(features, params, position_f64, None);
        let next_state = Self::enter_mode(state, StrategyMode::Normal, now_ms, true);
        DecisionOutput {
            next_state,
            intents: vec![intent],
            reason_codes: reasons,
        }
    }

    /// Build a `StrategyState` for entering `mode`: `mode_since_ms` resets
    /// only on an actual mode change, `last_quote_ms` advances when `quoted`.
    fn enter_mode(state: &StrategyState, mode: StrategyMode, now_ms: i64, quoted: bool) -> StrategyState {
        let mode_since_ms = if state.mode == mode { state.mode_since_ms } else { now_ms };
        StrategyState {
            mode,
            mode_since_ms,
            pause_until_ms: None,
            last_quote_ms: if quoted { Some(now_ms) } else { state.last_quote_ms },
        }
    }

    /// §4.5 pricing formula. `restrict_to` limits the quote to one side
    /// (Defensive-by-inventory); `None` quotes both sides.
    fn quote_intent(
        features: &Features,
        params: &StrategyParams,
        position_f64: f64,
        restrict_to: Option<Side>,
    ) -> Intent {
        let realized_vol_bps = features.realized_vol_10s * 10_000.0;
        let half_spread_bps = params.base_half_spread_bps
            + params.vol_spread_gain * realized_vol_bps
            + params.tox_spread_gain * features.trade_imbalance_1s.abs();
        let skew_bps = params.inventory_skew_gain * position_f64;

        let mid = features.mid_px;
        let bid_px_f64 = mid * (1.0 - (half_spread_bps + skew_bps) / 10_000.0);
        let ask_px_f64 = mid * (1.0 + (half_spread_bps - skew_bps) / 10_000.0);

        let raw_size = if mid > 0.0 { params.quote_size_usd / mid } else { 0.0 };
        let size_f64 = Self::round_down_to_lot(raw_size, params.lot_step);

        let to_decimal = |v: f64| Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO);
        let size = to_decimal(size_f64);

        let bid = match restrict_to {
            Some(Side::Sell) => None,
            _ => Some(QuoteSide { px: to_decimal(bid_px_f64), size }),
        };
        let ask = match restrict_to {
            Some(Side::Buy) => None,
            _ => Some(QuoteSide { px: to_decimal(ask_px_f64), size }),
        };

        Intent::Quote { bid, ask }
    }

    fn round_down_to_lot(size: f64, lot_step: f64) -> f64 {
        if lot_step <= 0.0 {
            return size;
        }
        (size / lot_step).floor() * lot_step
    }
}
