//! Wire-adjacent types at the venue port boundary (§6.1, §6.2). Every price
//! and size here is a `Decimal`; nothing on this boundary is ever an `f64`.

use rust_decimal::Decimal;
use quant_strategy::Side;
use serde::{Deserialize, Serialize};

/// Liquidity role of a fill, for fee accounting and the persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liquidity {
    Maker,
    Taker,
}

/// Classification carried by a trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Normal,
    Liquidation,
    Deleveraging,
}

/// Terminal/non-terminal status of a tracked order, as reported by the
/// venue's private order-update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

/// A normalized inbound market-data event, produced by a venue adapter
/// from whatever wire format the venue actually speaks (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Bbo {
        symbol: String,
        ts_ms: i64,
        seq: Option<u64>,
        best_bid_px: Decimal,
        best_bid_sz: Decimal,
        best_ask_px: Decimal,
        best_ask_sz: Decimal,
    },
    Trade {
        symbol: String,
        ts_ms: i64,
        seq: Option<u64>,
        px: Decimal,
        sz: Decimal,
        side: Side,
        kind: TradeKind,
    },
    Price {
        symbol: String,
        ts_ms: i64,
        seq: Option<u64>,
        mark_px: Option<Decimal>,
        index_px: Option<Decimal>,
    },
    Funding {
        symbol: String,
        ts_ms: i64,
        rate: Decimal,
    },
    Connected,
    Disconnected,
    Reconnecting {
        reason: String,
    },
}

/// A normalized inbound private-stream event (fills and order-state
/// transitions, §6.2).
#[derive(Debug, Clone, PartialEq)]
pub enum PrivateEvent {
    Fill {
        client_order_id: String,
        exchange_order_id: String,
        side: Side,
        price: Decimal,
        size: Decimal,
        fee: Decimal,
        liquidity: Liquidity,
    },
    OrderUpdate {
        client_order_id: String,
        exchange_order_id: Option<String>,
        status: OrderStatus,
        reason: Option<String>,
    },
}

/// Acknowledgement returned by `place_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceAck {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    pub ts_ms: i64,
}

/// A single open order as reported by `get_open_orders`, used by the
/// reconciler to detect drift (§4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub client_order_id: Option<String>,
    pub exchange_order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub created_at_ms: i64,
}

/// Venue-truth position snapshot, used by `PositionTracker::sync_from_venue`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenuePosition {
    pub size: Decimal,
    pub entry_px: Decimal,
}
