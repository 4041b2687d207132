//! Shared domain types passed across the pure C4-C7 boundary.
//!
//! Prices and sizes that cross a venue port are `Decimal`; everything
//! computed inside feature math is `f64`. Nothing in this module performs
//! I/O or reads a clock — callers always supply `now_ms` explicitly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the book an order or trade sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Classification carried by a trade print; liquidation/deleveraging prints
/// feed the coarse toxicity signal in [`crate::features::FeatureEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Normal,
    Liquidation,
    Deleveraging,
}

/// A single trade print retained within the trailing 10s window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSample {
    pub ts_ms: i64,
    pub px: f64,
    pub sz: f64,
    pub side: Side,
    pub kind: TradeKind,
}

/// A mid-price observation, recorded on every BBO update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidSnapshot {
    pub ts_ms: i64,
    pub mid_px: f64,
}

/// Immutable view of the market at `now_ms`, as built by the market-data
/// cache. This is the only place a `Decimal` and an `f64` sit side by side:
/// the decimal fields are the venue-bound truth, `now_ms`/`last_update_ms`
/// are plain timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub exchange: String,
    pub symbol: String,
    pub now_ms: i64,
    pub best_bid_px: Decimal,
    pub best_bid_sz: Decimal,
    pub best_ask_px: Decimal,
    pub best_ask_sz: Decimal,
    pub mark_px: Option<Decimal>,
    pub index_px: Option<Decimal>,
    pub last_update_ms: i64,
}

impl Snapshot {
    /// `true` iff the cache has ever seen a BBO update and both sides are
    /// positive. Mirrors `MarketDataCache::has_valid_data`.
    pub fn has_valid_data(&self) -> bool {
        self.last_update_ms > 0 && self.best_bid_px > Decimal::ZERO && self.best_ask_px > Decimal::ZERO
    }

    pub fn mid_px_f64(&self) -> f64 {
        let mid = (self.best_bid_px + self.best_ask_px) / Decimal::from(2);
        mid.to_f64().unwrap_or(0.0)
    }
}

/// Derived microstructure features. Pure function output of
/// [`crate::features::FeatureEngine::compute`]; never constructed any other
/// way in production code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    pub mid_px: f64,
    pub spread_bps: f64,
    pub realized_vol_10s: f64,
    pub trade_imbalance_1s: f64,
    pub mark_index_div_bps: f64,
    pub liq_count_10s: u32,
    pub toxic: bool,
}

/// Trading mode of the [`crate::decision::DecisionEngine`] state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyMode {
    Normal,
    Defensive,
    Pause,
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyMode::Normal => "normal",
            StrategyMode::Defensive => "defensive",
            StrategyMode::Pause => "pause",
        };
        f.write_str(s)
    }
}

/// Carried between ticks by the tick loop. Cold start begins in `Pause`
/// with no `last_quote_ms`, per the decision engine's transition table.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyState {
    pub mode: StrategyMode,
    pub mode_since_ms: i64,
    pub pause_until_ms: Option<i64>,
    pub last_quote_ms: Option<i64>,
}

impl StrategyState {
    pub fn cold_start(now_ms: i64) -> Self {
        Self {
            mode: StrategyMode::Pause,
            mode_since_ms: now_ms,
            pause_until_ms: Some(now_ms),
            last_quote_ms: None,
        }
    }
}

/// One side of a target quote: the price and size the decision engine
/// wants live on that side. Absent on a side the engine does not want
/// quoted at all (Defensive-by-inventory quotes only the reducing side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteSide {
    pub px: Decimal,
    pub size: Decimal,
}

/// Declarative output of the decision engine: "what we want to be doing".
/// `Quote` carries an independent target per side rather than a single
/// bid/ask pair so Defensive-by-inventory can express "reducing side only"
/// without a separate intent variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Quote {
        bid: Option<QuoteSide>,
        ask: Option<QuoteSide>,
    },
    CancelAll,
}

/// Imperative output of the execution planner: "what to call on the venue
/// next". Distinct from `Intent` because a single `Quote` intent can
/// require zero, one, or two venue calls per side depending on drift.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Place {
        side: Side,
        price: Decimal,
        size: Decimal,
    },
    Cancel {
        client_order_id: String,
    },
    CancelAll,
}

/// Minimal view of a live order the planner needs to decide whether to
/// requote. `quant_core::tracker::OrderTracker` builds these from its
/// richer `TrackedOrder` records; the planner itself never sees the full
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveOrderView {
    pub client_order_id: String,
    pub price: Decimal,
    pub created_at_ms: i64,
}
