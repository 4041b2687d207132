//! C4: pure derivation of microstructure features from a snapshot and its
//! trailing windows. Nothing here reads a clock or mutates anything; the
//! caller (the market-data cache) is responsible for windowing trades and
//! mids to the trailing intervals this module expects.

use rust_decimal::prelude::ToPrimitive;

use crate::params::StrategyParams;
use crate::types::{Features, MidSnapshot, Snapshot, TradeKind, TradeSample};

/// Stateless — exists only to namespace the computation and give tests a
/// stable call site.
pub struct FeatureEngine;

impl FeatureEngine {
    /// `trades_1s`/`trades_10s` and `mids_10s` must already be windowed by
    /// the caller (`MarketDataCache::trades_in_window`/`mids_in_window`);
    /// this function does not re-filter by timestamp.
    pub fn compute(
        snapshot: &Snapshot,
        trades_1s: &[TradeSample],
        trades_10s: &[TradeSample],
        mids_10s: &[MidSnapshot],
        params: &StrategyParams,
    ) -> Features {
        let mid_px = snapshot.mid_px_f64();
        let spread_bps = Self::spread_bps(snapshot);
        let realized_vol_10s = Self::realized_vol(mids_10s);
        let trade_imbalance_1s = Self::trade_imbalance(trades_1s);
        let mark_index_div_bps = Self::mark_index_div_bps(snapshot);
        let liq_count_10s = trades_10s
            .iter()
            .filter(|t| matches!(t.kind, TradeKind::Liquidation | TradeKind::Deleveraging))
            .count() as u32;
        let toxic = liq_count_10s > 0
            || trade_imbalance_1s.abs() >= params.tox_imbalance_threshold;

        Features {
            mid_px,
            spread_bps,
            realized_vol_10s,
            trade_imbalance_1s,
            mark_index_div_bps,
            liq_count_10s,
            toxic,
        }
    }

    fn spread_bps(snapshot: &Snapshot) -> f64 {
        let bid = snapshot.best_bid_px.to_f64().unwrap_or(0.0);
        let ask = snapshot.best_ask_px.to_f64().unwrap_or(0.0);
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 {
            return 0.0;
        }
        ((ask - bid) / mid) * 10_000.0
    }

    /// Standard deviation of log-returns of the trailing mid series.
    /// Zero with fewer than two samples, matching §4.4.
    fn realized_vol(mids: &[MidSnapshot]) -> f64 {
        if mids.len() < 2 {
            return 0.0;
        }
        let log_returns: Vec<f64> = mids
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (pair[0].mid_px, pair[1].mid_px);
                if prev > 0.0 && next > 0.0 {
                    Some((next / prev).ln())
                } else {
                    None
                }
            })
            .collect();
        if log_returns.len() < 2 {
            return 0.0;
        }
        let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
        let variance = log_returns
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / log_returns.len() as f64;
        variance.sqrt()
    }

    /// `(buy_size - sell_size) / total_size` over the supplied window;
    /// zero if the window is empty.
    fn trade_imbalance(trades: &[TradeSample]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let (buy, sell) = trades.iter().fold((0.0, 0.0), |(b, s), t| match t.side {
            crate::types::Side::Buy => (b + t.sz, s),
            crate::types::Side::Sell => (b, s + t.sz),
        });
        let total = buy + sell;
        if total <= 0.0 {
            return 0.0;
        }
        (buy - sell) / total
    }

    fn mark_index_div_bps(snapshot: &Snapshot) -> f64 {
        match (snapshot.mark_px, snapshot.index_px) {
            (Some(mark), Some(index)) => {
                let mark = mark.to_f64().unwrap_or(0.0);
                let index = index.to_f64().unwrap_or(0.0);
                if index <= 0.0 {
                    0.0
                } else {
                    ((mark - index) / index) * 10_000.0
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{snapshot_at, trade};
    use approx::assert_relative_eq;

    #[test]
    fn mid_and_spread_from_bbo() {
        let snap = snapshot_at(100, "100", "100.1", 1_000);
        let params = StrategyParams::default();
        let features = FeatureEngine::compute(&snap, &[], &[], &[], &params);
        assert_relative_eq!(features.mid_px, 100.05, epsilon = 1e-9);
        assert!(features.spread_bps > 0.0);
    }

    #[test]
    fn vol_is_zero_with_fewer_than_two_samples() {
        let snap = snapshot_at(100, "100", "100.1", 1_000);
        let params = StrategyParams::default();
        let mids = vec![MidSnapshot { ts_ms: 1_000, mid_px: 100.0 }];
        let features = FeatureEngine::compute(&snap, &[], &[], &mids, &params);
        assert_eq!(features.realized_vol_10s, 0.0);
    }

    #[test]
    fn trade_imbalance_all_buys_is_one() {
        let snap = snapshot_at(100, "100", "100.1", 1_000);
        let params = StrategyParams::default();
        let trades = vec![trade(900, 100.0, 1.0, crate::types::Side::Buy)];
        let features = FeatureEngine::compute(&snap, &trades, &trades, &[], &params);
        assert_relative_eq!(features.trade_imbalance_1s, 1.0);
    }

    #[test]
    fn liquidation_trades_set_toxic_flag() {
        let snap = snapshot_at(100, "100", "100.1", 1_000);
        let params = StrategyParams::default();
        let trades = vec![TradeSample {
            ts_ms: 950,
            px: 99.0,
            sz: 5.0,
            side: crate::types::Side::Sell,
            kind: TradeKind::Liquidation,
        }];
        let features = FeatureEngine::compute(&snap, &[], &trades, &[], &params);
        assert_eq!(features.liq_count_10s, 1);
        assert!(features.toxic);
    }
}
