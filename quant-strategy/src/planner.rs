//! C6: diffs an `Intent` against the live order view and produces the
//! minimal ordered action list to close the gap. Pure — no channel, no
//! clock besides `now_ms`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::params::StrategyParams;
use crate::types::{ExecutionAction, Intent, LiveOrderView, QuoteSide, Side};

/// Minimum relative price move, in bps, that justifies cancelling and
/// replacing a resting order once the refresh window has elapsed.
pub const MIN_REQUOTE_BPS: f64 = 1.0;

pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Buy side is always planned before sell side; within a side, a
    /// cancel always precedes its replacement place.
    pub fn plan(
        intent: &Intent,
        live_bid: Option<&LiveOrderView>,
        live_ask: Option<&LiveOrderView>,
        last_quote_ms: Option<i64>,
        now_ms: i64,
        params: &StrategyParams,
        mid_px: f64,
    ) -> Vec<ExecutionAction> {
        match intent {
            Intent::CancelAll => vec![ExecutionAction::CancelAll],
            Intent::Quote { bid, ask } => {
                let mut actions = Self::plan_side(Side::Buy, bid.as_ref(), live_bid, last_quote_ms, now_ms, params, mid_px);
                actions.extend(Self::plan_side(Side::Sell, ask.as_ref(), live_ask, last_quote_ms, now_ms, params, mid_px));
                actions
            }
        }
    }

    fn plan_side(
        side: Side,
        target: Option<&QuoteSide>,
        live: Option<&LiveOrderView>,
        last_quote_ms: Option<i64>,
        now_ms: i64,
        params: &StrategyParams,
        mid_px: f64,
    ) -> Vec<ExecutionAction> {
        let target = match target {
            Some(t) => t,
            // Engine does not want this side quoted at all; cancel anything resting there.
            None => {
                return match live {
                    Some(order) => vec![ExecutionAction::Cancel { client_order_id: order.client_order_id.clone() }],
                    None => vec![],
                };
            }
        };

        let can_refresh = match last_quote_ms {
            None => true,
            Some(last) => now_ms - last >= params.refresh_interval_ms,
        };

        match live {
            None => {
                if can_refresh {
                    vec![ExecutionAction::Place { side, price: target.px, size: target.size }]
                } else {
                    vec![]
                }
            }
            Some(order) => {
                let order_stale = now_ms - order.created_at_ms > params.stale_cancel_ms;
                let drifted = can_refresh && Self::delta_bps(order.price, target.px, mid_px) >= MIN_REQUOTE_BPS;
                if order_stale || drifted {
                    vec![
                        ExecutionAction::Cancel { client_order_id: order.client_order_id.clone() },
                        ExecutionAction::Place { side, price: target.px, size: target.size },
                    ]
                } else {
                    vec![]
                }
            }
        }
    }

    fn delta_bps(current: Decimal, target: Decimal, mid_px: f64) -> f64 {
        if mid_px <= 0.0 {
            return 0.0;
        }
        let current = current.to_f64().unwrap_or(0.0);
        let target = target.to_f64().unwrap_or(0.0);
        ((target - current).abs() / mid_px) * 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> StrategyParams {
        StrategyParams { refresh_interval_ms: 1_000, stale_cancel_ms: 60_000, ..StrategyParams::default() }
    }

    #[test]
    fn no_action_when_within_tolerance() {
        let live_bid = LiveOrderView { client_order_id: "c1".into(), price: dec!(100), created_at_ms: 0 };
        let intent = Intent::Quote {
            bid: Some(QuoteSide { px: dec!(100.005), size: dec!(1) }),
            ask: None,
        };
        let actions = ExecutionPlanner::plan(&intent, Some(&live_bid), None, Some(0), 1_000, &params(), 100.0);
        assert!(actions.is_empty());
    }

    #[test]
    fn requotes_when_drifted_past_threshold() {
        let live_bid = LiveOrderView { client_order_id: "c1".into(), price: dec!(100), created_at_ms: 0 };
        let intent = Intent::Quote {
            bid: Some(QuoteSide { px: dec!(100.02), size: dec!(1) }),
            ask: None,
        };
        let actions = ExecutionPlanner::plan(&intent, Some(&live_bid), None, Some(0), 1_000, &params(), 100.0);
        assert_eq!(
            actions,
            vec![
                ExecutionAction::Cancel { client_order_id: "c1".into() },
                ExecutionAction::Place { side: Side::Buy, price: dec!(100.02), size: dec!(1) },
            ]
        );
    }

    #[test]
    fn places_fresh_order_when_none_live_and_refresh_elapsed() {
        let intent = Intent::Quote {
            bid: Some(QuoteSide { px: dec!(100), size: dec!(1) }),
            ask: None,
        };
        let actions = ExecutionPlanner::plan(&intent, None, None, None, 1_000, &params(), 100.0);
        assert_eq!(actions, vec![ExecutionAction::Place { side: Side::Buy, price: dec!(100), size: dec!(1) }]);
    }

    #[test]
    fn fallback_keys_cancel_when_side_not_wanted() {
        let live_ask = LiveOrderView { client_order_id: "__ext_222".into(), price: dec!(100.1), created_at_ms: 0 };
        let intent = Intent::Quote {
            bid: Some(QuoteSide { px: dec!(100), size: dec!(1) }),
            ask: None,
        };
        let actions = ExecutionPlanner::plan(&intent, None, Some(&live_ask), Some(0), 1_000, &params(), 100.0);
        assert!(actions.contains(&ExecutionAction::Cancel { client_order_id: "__ext_222".into() }));
    }

    #[test]
    fn cancel_all_intent_ignores_live_orders() {
        let actions = ExecutionPlanner::plan(&Intent::CancelAll, None, None, None, 0, &params(), 100.0);
        assert_eq!(actions, vec![ExecutionAction::CancelAll]);
    }
}
