//! C1: MarketDataCache. Holds the latest BBO/mark/index/funding and
//! ring-buffers recent trades and mid snapshots for feature computation.
//! Exclusively owned and mutated by the tick loop (§5) — venue event
//! handlers only ever send normalized events into its inbox; they never
//! touch this struct directly.

use rust_decimal::Decimal;

use quant_strategy::{MidSnapshot, Side, Snapshot, TradeKind as StrategyTradeKind, TradeSample};

use crate::venue::types::{MarketEvent, TradeKind as WireTradeKind};

const TRADE_WINDOW_MS: i64 = 10_000;
const MID_WINDOW_MS: i64 = 10_000;

fn to_strategy_trade_kind(kind: WireTradeKind) -> StrategyTradeKind {
    match kind {
        WireTradeKind::Normal => StrategyTradeKind::Normal,
        WireTradeKind::Liquidation => StrategyTradeKind::Liquidation,
        WireTradeKind::Deleveraging => StrategyTradeKind::Deleveraging,
    }
}

#[derive(Debug, Clone)]
pub struct MarketDataCache {
    exchange: String,
    symbol: String,
    best_bid_px: Decimal,
    best_bid_sz: Decimal,
    best_ask_px: Decimal,
    best_ask_sz: Decimal,
    mark_px: Option<Decimal>,
    index_px: Option<Decimal>,
    last_update_ms: i64,
    last_funding_rate: Option<Decimal>,
    trades: Vec<TradeSample>,
    mids: Vec<MidSnapshot>,
}

impl MarketDataCache {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            best_bid_px: Decimal::ZERO,
            best_bid_sz: Decimal::ZERO,
            best_ask_px: Decimal::ZERO,
            best_ask_sz: Decimal::ZERO,
            mark_px: None,
            index_px: None,
            last_update_ms: 0,
            last_funding_rate: None,
            trades: Vec::new(),
            mids: Vec::new(),
        }
    }

    /// Dispatches one normalized venue event onto the relevant update
    /// method. `Connected`/`Disconnected`/`Reconnecting` carry no cache
    /// state and are ignored here — they're handled by the tick loop's
    /// connection-status bookkeeping instead.
    pub fn apply(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::Bbo { ts_ms, best_bid_px, best_bid_sz, best_ask_px, best_ask_sz, .. } => {
                self.update_bbo(*ts_ms, *best_bid_px, *best_bid_sz, *best_ask_px, *best_ask_sz);
            }
            MarketEvent::Trade { ts_ms, px, sz, side, kind, .. } => {
                self.add_trade(*ts_ms, *px, *sz, *side, *kind);
            }
            MarketEvent::Price { ts_ms, mark_px, index_px, .. } => {
                self.update_price(*ts_ms, *mark_px, *index_px);
            }
            MarketEvent::Funding { ts_ms, rate, .. } => {
                self.update_funding(*ts_ms, *rate);
            }
            MarketEvent::Connected | MarketEvent::Disconnected | MarketEvent::Reconnecting { .. } => {}
        }
    }

    pub fn update_bbo(&mut self, ts_ms: i64, bid_px: Decimal, bid_sz: Decimal, ask_px: Decimal, ask_sz: Decimal) {
        self.best_bid_px = bid_px;
        self.best_bid_sz = bid_sz;
        self.best_ask_px = ask_px;
        self.best_ask_sz = ask_sz;
        self.last_update_ms = self.last_update_ms.max(ts_ms);

        let mid = (bid_px + ask_px) / Decimal::from(2);
        use rust_decimal::prelude::ToPrimitive;
        self.mids.push(MidSnapshot { ts_ms, mid_px: mid.to_f64().unwrap_or(0.0) });
        self.prune(ts_ms);
    }

    pub fn add_trade(&mut self, ts_ms: i64, px: Decimal, sz: Decimal, side: Side, kind: WireTradeKind) {
        use rust_decimal::prelude::ToPrimitive;
        self.trades.push(TradeSample {
            ts_ms,
            px: px.to_f64().unwrap_or(0.0),
            sz: sz.to_f64().unwrap_or(0.0),
            side,
            kind: to_strategy_trade_kind(kind),
        });
        self.last_update_ms = self.last_update_ms.max(ts_ms);
        self.prune(ts_ms);
    }

    pub fn update_price(&mut self, ts_ms: i64, mark_px: Option<Decimal>, index_px: Option<Decimal>) {
        if let Some(mark) = mark_px {
            self.mark_px = Some(mark);
        }
        if let Some(index) = index_px {
            self.index_px = Some(index);
        }
        self.last_update_ms = self.last_update_ms.max(ts_ms);
    }

    pub fn update_funding(&mut self, ts_ms: i64, rate: Decimal) {
        self.last_funding_rate = Some(rate);
        self.last_update_ms = self.last_update_ms.max(ts_ms);
    }

    pub fn last_funding_rate(&self) -> Option<Decimal> {
        self.last_funding_rate
    }

    fn prune(&mut self, now_ms: i64) {
        self.trades.retain(|t| now_ms - t.ts_ms <= TRADE_WINDOW_MS);
        self.mids.retain(|m| now_ms - m.ts_ms <= MID_WINDOW_MS);
    }

    pub fn get_snapshot(&self, now_ms: i64) -> Snapshot {
        Snapshot {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            now_ms,
            best_bid_px: self.best_bid_px,
            best_bid_sz: self.best_bid_sz,
            best_ask_px: self.best_ask_px,
            best_ask_sz: self.best_ask_sz,
            mark_px: self.mark_px,
            index_px: self.index_px,
            last_update_ms: self.last_update_ms,
        }
    }

    pub fn trades_in_window(&self, now_ms: i64, window_ms: i64) -> Vec<TradeSample> {
        self.trades.iter().filter(|t| now_ms - t.ts_ms <= window_ms).copied().collect()
    }

    pub fn mids_in_window(&self, now_ms: i64, window_ms: i64) -> Vec<MidSnapshot> {
        self.mids.iter().filter(|m| now_ms - m.ts_ms <= window_ms).copied().collect()
    }

    pub fn has_valid_data(&self) -> bool {
        self.last_update_ms > 0 && self.best_bid_px > Decimal::ZERO && self.best_ask_px > Decimal::ZERO
    }

    /// Called after a forced reconnect (§6.1): the next BBO/mark/index
    /// update starts from a clean slate rather than mixing pre- and
    /// post-reconnect state.
    pub fn clear(&mut self) {
        self.best_bid_px = Decimal::ZERO;
        self.best_bid_sz = Decimal::ZERO;
        self.best_ask_px = Decimal::ZERO;
        self.best_ask_sz = Decimal::ZERO;
        self.mark_px = None;
        self.index_px = None;
        self.last_update_ms = 0;
        self.trades.clear();
        self.mids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cache() -> MarketDataCache {
        MarketDataCache::new("test-exchange", "BTC-PERP")
    }

    #[test]
    fn no_valid_data_before_first_bbo() {
        let c = cache();
        assert!(!c.has_valid_data());
    }

    #[test]
    fn bbo_update_marks_valid_and_records_mid() {
        let mut c = cache();
        c.update_bbo(1_000, dec!(100), dec!(1), dec!(100.1), dec!(1));
        assert!(c.has_valid_data());
        let snapshot = c.get_snapshot(1_000);
        assert_eq!(snapshot.best_bid_px, dec!(100));
        assert_eq!(c.mids_in_window(1_000, 10_000).len(), 1);
    }

    #[test]
    fn trades_and_mids_are_pruned_outside_window() {
        let mut c = cache();
        c.update_bbo(0, dec!(100), dec!(1), dec!(100.1), dec!(1));
        c.add_trade(0, dec!(100), dec!(1), Side::Buy, WireTradeKind::Normal);
        c.update_bbo(11_000, dec!(101), dec!(1), dec!(101.1), dec!(1));
        assert_eq!(c.trades_in_window(11_000, 10_000).len(), 0);
        assert_eq!(c.mids_in_window(11_000, 10_000).len(), 1);
    }

    #[test]
    fn clear_resets_valid_data_flag() {
        let mut c = cache();
        c.update_bbo(1_000, dec!(100), dec!(1), dec!(100.1), dec!(1));
        c.clear();
        assert!(!c.has_valid_data());
        assert!(c.mids_in_window(1_000, 10_000).is_empty());
    }

    #[test]
    fn update_price_overwrites_only_present_fields() {
        let mut c = cache();
        c.update_price(0, Some(dec!(100)), Some(dec!(99.5)));
        c.update_price(1, Some(dec!(101)), None);
        let snapshot = c.get_snapshot(1);
        assert_eq!(snapshot.mark_px, Some(dec!(101)));
        assert_eq!(snapshot.index_px, Some(dec!(99.5)));
    }
}
