//! Construction helpers shared by this crate's unit tests. Not part of the
//! public API; only compiled under `#[cfg(test)]`.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::types::{Side, Snapshot, TradeKind, TradeSample};

pub fn snapshot_at(now_ms: i64, bid: &str, ask: &str, last_update_ms: i64) -> Snapshot {
    Snapshot {
        exchange: "test-exchange".to_string(),
        symbol: "BTC-PERP".to_string(),
        now_ms,
        best_bid_px: Decimal::from_str(bid).unwrap(),
        best_bid_sz: Decimal::from_str("1").unwrap(),
        best_ask_px: Decimal::from_str(ask).unwrap(),
        best_ask_sz: Decimal::from_str("1").unwrap(),
        mark_px: None,
        index_px: None,
        last_update_ms,
    }
}

pub fn trade(ts_ms: i64, px: f64, sz: f64, side: Side) -> TradeSample {
    TradeSample {
        ts_ms,
        px,
        sz,
        side,
        kind: TradeKind::Normal,
    }
}
