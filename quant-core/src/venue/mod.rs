//! C9: normalizes venue wire formats into the domain events in [`types`]
//! and exposes the outbound execution port every venue adapter implements.

pub mod mock;
pub mod private_ws;
pub mod rest;
pub mod types;
pub mod ws;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::VenueError;
use quant_strategy::Side;
use types::{OpenOrder, PlaceAck, VenuePosition};

/// Outbound execution port (§6.2). Adapters translate each call into a
/// signed venue request and map whatever error shape the venue returns
/// onto [`VenueError`] at a single `map_error` site — no string matching
/// on error messages anywhere else in the core.
#[async_trait]
pub trait VenuePort: Send + Sync {
    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> Result<PlaceAck, VenueError>;

    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
        symbol: &str,
    ) -> Result<(), VenueError>;

    async fn cancel_all(&self, symbol: &str) -> Result<(), VenueError>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, VenueError>;

    async fn get_position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError>;
}
