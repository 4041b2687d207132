//! In-memory `VenuePort` for unit and integration tests. Gated behind the
//! `testing` feature so it never ships in a production build.

#![cfg(any(test, feature = "testing"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::types::{OpenOrder, OrderStatus, PlaceAck, VenuePosition};
use super::VenuePort;
use crate::errors::VenueError;
use quant_strategy::Side;

#[derive(Debug, Clone)]
struct MockOrder {
    client_order_id: String,
    exchange_order_id: String,
    side: Side,
    price: Decimal,
    size: Decimal,
    filled_size: Decimal,
    created_at_ms: i64,
}

/// A scripted `VenuePort`: places/cancels succeed against an in-memory
/// book, and the next error (if any) can be queued ahead of time so tests
/// can exercise the planner/tick-loop's error-handling paths without a
/// real network.
pub struct MockVenuePort {
    open_orders: Mutex<Vec<MockOrder>>,
    position: Mutex<Option<VenuePosition>>,
    next_error: Mutex<Option<VenueError>>,
    next_exchange_id: Mutex<u64>,
}

impl MockVenuePort {
    pub fn new() -> Self {
        Self {
            open_orders: Mutex::new(Vec::new()),
            position: Mutex::new(None),
            next_error: Mutex::new(None),
            next_exchange_id: Mutex::new(1),
        }
    }

    pub fn queue_error(&self, err: VenueError) {
        *self.next_error.lock() = Some(err);
    }

    pub fn set_position(&self, position: Option<VenuePosition>) {
        *self.position.lock() = position;
    }

    pub fn open_order_count(&self) -> usize {
        self.open_orders.lock().len()
    }

    fn take_queued_error(&self) -> Option<VenueError> {
        self.next_error.lock().take()
    }
}

impl Default for MockVenuePort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenuePort for MockVenuePort {
    async fn place_order(
        &self,
        client_order_id: &str,
        _symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        _post_only: bool,
    ) -> Result<PlaceAck, VenueError> {
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        let mut next_id = self.next_exchange_id.lock();
        let exchange_order_id = format!("mock-{}", *next_id);
        *next_id += 1;

        self.open_orders.lock().push(MockOrder {
            client_order_id: client_order_id.to_string(),
            exchange_order_id: exchange_order_id.clone(),
            side,
            price,
            size,
            filled_size: Decimal::ZERO,
            created_at_ms: 0,
        });

        Ok(PlaceAck {
            client_order_id: client_order_id.to_string(),
            exchange_order_id: Some(exchange_order_id),
            status: OrderStatus::Open,
            ts_ms: 0,
        })
    }

    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
        _symbol: &str,
    ) -> Result<(), VenueError> {
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        self.open_orders.lock().retain(|o| {
            !(Some(o.client_order_id.as_str()) == client_order_id
                || Some(o.exchange_order_id.as_str()) == exchange_order_id)
        });
        Ok(())
    }

    async fn cancel_all(&self, _symbol: &str) -> Result<(), VenueError> {
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        self.open_orders.lock().clear();
        Ok(())
    }

    async fn get_open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, VenueError> {
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        Ok(self
            .open_orders
            .lock()
            .iter()
            .map(|o| OpenOrder {
                client_order_id: Some(o.client_order_id.clone()),
                exchange_order_id: o.exchange_order_id.clone(),
                side: o.side,
                price: o.price,
                size: o.size,
                filled_size: o.filled_size,
                created_at_ms: o.created_at_ms,
            })
            .collect())
    }

    async fn get_position(&self, _symbol: &str) -> Result<Option<VenuePosition>, VenueError> {
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        Ok(*self.position.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn place_then_cancel_removes_order() {
        let venue = MockVenuePort::new();
        venue
            .place_order("c1", "BTC-PERP", Side::Buy, Decimal::from(100), Decimal::from(1), true)
            .await
            .unwrap();
        assert_eq!(venue.open_order_count(), 1);

        venue.cancel_order(Some("c1"), None, "BTC-PERP").await.unwrap();
        assert_eq!(venue.open_order_count(), 0);
    }

    #[tokio::test]
    async fn queued_error_is_returned_once() {
        let venue = MockVenuePort::new();
        venue.queue_error(VenueError::Auth);
        let result = venue
            .place_order("c1", "BTC-PERP", Side::Buy, Decimal::from(100), Decimal::from(1), true)
            .await;
        assert_eq!(result, Err(VenueError::Auth));

        let result = venue
            .place_order("c2", "BTC-PERP", Side::Buy, Decimal::from(100), Decimal::from(1), true)
            .await;
        assert!(result.is_ok());
    }
}
