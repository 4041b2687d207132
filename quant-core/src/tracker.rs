//! C2: OrderTracker. The authoritative in-memory map of live orders,
//! keyed by client order id. Exclusively owned by the tick loop (§5).

use std::collections::HashMap;

use rust_decimal::Decimal;

use quant_strategy::{LiveOrderView, Side};

use crate::venue::types::{OpenOrder, OrderStatus, PrivateEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub created_at_ms: i64,
}

impl TrackedOrder {
    pub fn to_live_view(&self) -> LiveOrderView {
        LiveOrderView {
            client_order_id: self.client_order_id.clone(),
            price: self.price,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Builds the fallback key used when a venue-reported open order has no
/// (or a blank) client-supplied id, so two externally-placed orders never
/// collapse onto the same map entry (§4.2).
fn fallback_key(exchange_order_id: &str) -> String {
    format!("__ext_{exchange_order_id}")
}

#[derive(Debug, Clone, Default)]
pub struct OrderTracker {
    orders: HashMap<String, TrackedOrder>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, order: TrackedOrder) {
        self.orders.insert(order.client_order_id.clone(), order);
    }

    pub fn remove_by_client_id(&mut self, client_order_id: &str) -> Option<TrackedOrder> {
        self.orders.remove(client_order_id)
    }

    /// Newest live order on the buy side, or the only one if exactly one
    /// exists. Ties (shouldn't occur under the two-order invariant) break
    /// on insertion order via the most recent `created_at_ms`.
    pub fn get_bid_order(&self) -> Option<&TrackedOrder> {
        self.orders.values().filter(|o| o.side == Side::Buy).max_by_key(|o| o.created_at_ms)
    }

    pub fn get_ask_order(&self) -> Option<&TrackedOrder> {
        self.orders.values().filter(|o| o.side == Side::Sell).max_by_key(|o| o.created_at_ms)
    }

    pub fn active_orders(&self) -> Vec<&TrackedOrder> {
        self.orders.values().collect()
    }

    pub fn active_count(&self) -> usize {
        self.orders.len()
    }

    pub fn count_on_side(&self, side: Side) -> usize {
        self.orders.values().filter(|o| o.side == side).count()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    /// Accumulates filled size; deletes the entry once `filled_size`
    /// reaches `size` (§4.2, §8 universal invariant).
    pub fn apply_fill(&mut self, client_order_id: &str, fill_size: Decimal) {
        let mut should_remove = false;
        if let Some(order) = self.orders.get_mut(client_order_id) {
            order.filled_size += fill_size;
            if order.filled_size >= order.size {
                should_remove = true;
            }
        }
        if should_remove {
            self.orders.remove(client_order_id);
        }
    }

    pub fn apply_terminal(&mut self, client_order_id: &str, status: OrderStatus) {
        if status.is_terminal() {
            self.orders.remove(client_order_id);
        }
    }

    pub fn apply_private_event(&mut self, event: &PrivateEvent) {
        match event {
            PrivateEvent::Fill { client_order_id, size, .. } => {
                self.apply_fill(client_order_id, *size);
            }
            PrivateEvent::OrderUpdate { client_order_id, status, .. } => {
                self.apply_terminal(client_order_id, *status);
            }
        }
    }

    /// Rebuilds the tracker from venue truth, applying the fallback key
    /// scheme for empty or whitespace-only client ids (§4.2, §8 scenario 5).
    pub fn sync_from_venue(&mut self, open_orders: &[OpenOrder]) {
        self.orders.clear();
        for o in open_orders {
            let key = match &o.client_order_id {
                Some(id) if !id.trim().is_empty() => id.clone(),
                _ => fallback_key(&o.exchange_order_id),
            };
            self.orders.insert(
                key.clone(),
                TrackedOrder {
                    client_order_id: key,
                    exchange_order_id: Some(o.exchange_order_id.clone()),
                    side: o.side,
                    price: o.price,
                    size: o.size,
                    filled_size: o.filled_size,
                    created_at_ms: o.created_at_ms,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: &str, side: Side, price: Decimal, size: Decimal) -> TrackedOrder {
        TrackedOrder {
            client_order_id: id.to_string(),
            exchange_order_id: Some(format!("ex-{id}")),
            side,
            price,
            size,
            filled_size: Decimal::ZERO,
            created_at_ms: 0,
        }
    }

    #[test]
    fn fill_reaching_size_removes_order() {
        let mut tracker = OrderTracker::new();
        tracker.add(order("c1", Side::Buy, dec!(100), dec!(1)));
        tracker.apply_fill("c1", dec!(1));
        assert!(tracker.get_bid_order().is_none());
    }

    #[test]
    fn partial_fill_keeps_order_live() {
        let mut tracker = OrderTracker::new();
        tracker.add(order("c1", Side::Buy, dec!(100), dec!(1)));
        tracker.apply_fill("c1", dec!(0.5));
        assert!(tracker.get_bid_order().is_some());
        assert_eq!(tracker.get_bid_order().unwrap().filled_size, dec!(0.5));
    }

    #[test]
    fn sync_from_venue_applies_fallback_keys_for_blank_client_ids() {
        let mut tracker = OrderTracker::new();
        let open = vec![
            OpenOrder {
                client_order_id: None,
                exchange_order_id: "111".to_string(),
                side: Side::Buy,
                price: dec!(100),
                size: dec!(1),
                filled_size: Decimal::ZERO,
                created_at_ms: 0,
            },
            OpenOrder {
                client_order_id: Some("   ".to_string()),
                exchange_order_id: "222".to_string(),
                side: Side::Sell,
                price: dec!(101),
                size: dec!(1),
                filled_size: Decimal::ZERO,
                created_at_ms: 0,
            },
        ];
        tracker.sync_from_venue(&open);
        assert_eq!(tracker.active_count(), 2);
        assert!(tracker.remove_by_client_id("__ext_111").is_some());
        assert!(tracker.remove_by_client_id("__ext_222").is_some());
    }

    #[test]
    fn apply_terminal_removes_only_on_terminal_status() {
        let mut tracker = OrderTracker::new();
        tracker.add(order("c1", Side::Buy, dec!(100), dec!(1)));
        tracker.apply_terminal("c1", OrderStatus::Open);
        assert!(tracker.get_bid_order().is_some());
        tracker.apply_terminal("c1", OrderStatus::Cancelled);
        assert!(tracker.get_bid_order().is_none());
    }
}
