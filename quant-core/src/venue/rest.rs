//! REST execution adapter. Assumes the supplied `reqwest::Client` is
//! already wired with whatever auth headers the venue's signing layer
//! attaches per-request — the core never touches credentials directly
//! (§1 Non-goals).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use super::types::{OpenOrder, OrderStatus, PlaceAck, VenuePosition};
use super::VenuePort;
use crate::errors::VenueError;
use quant_strategy::Side;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Venue REST execution port, speaking a generic place/cancel/open-orders
/// HTTP API. Concrete venues with a different request shape implement
/// their own `VenuePort`; this adapter is the reference shape §6.2
/// describes.
pub struct RestVenuePort {
    client: Client,
    base_url: String,
}

impl RestVenuePort {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Single mapping site from an HTTP response onto the domain error
    /// taxonomy (§6.2). No other call site inspects status codes or
    /// response bodies for error classification.
    async fn map_error(resp: reqwest::Response) -> VenueError {
        let status = resp.status();
        let retry_after_ms = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1_000);
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::TOO_MANY_REQUESTS => VenueError::RateLimit { retry_after_ms },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VenueError::Auth,
            StatusCode::BAD_REQUEST => VenueError::InvalidOrder(body),
            StatusCode::PAYMENT_REQUIRED | StatusCode::CONFLICT => VenueError::InsufficientBalance,
            s if s.is_server_error() => VenueError::ExchangeError { code: Some(s.as_u16() as i64) },
            _ => VenueError::Unknown(body),
        }
    }

    fn map_transport_error(err: reqwest::Error) -> VenueError {
        if err.is_timeout() || err.is_connect() {
            VenueError::Network(err.to_string())
        } else {
            VenueError::Unknown(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    client_order_id: String,
    exchange_order_id: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct OpenOrderResponse {
    client_order_id: Option<String>,
    exchange_order_id: String,
    side: String,
    price: Decimal,
    size: Decimal,
    filled_size: Decimal,
    created_at_ms: i64,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    size: Decimal,
    entry_px: Decimal,
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "open" => OrderStatus::Open,
        "filled" => OrderStatus::Filled,
        "cancelled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

fn parse_side(s: &str) -> Side {
    if s.eq_ignore_ascii_case("sell") {
        Side::Sell
    } else {
        Side::Buy
    }
}

#[async_trait]
impl VenuePort for RestVenuePort {
    #[instrument(skip(self), fields(op = "place_order"))]
    async fn place_order(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> Result<PlaceAck, VenueError> {
        let side_str = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let resp = self
            .client
            .post(self.url("/orders"))
            .timeout(CALL_TIMEOUT)
            .json(&serde_json::json!({
                "client_order_id": client_order_id,
                "symbol": symbol,
                "side": side_str,
                "price": price.to_string(),
                "size": size.to_string(),
                "post_only": post_only,
            }))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                return Err(VenueError::PostOnlyRejected);
            }
            return Err(Self::map_error(resp).await);
        }

        let body: PlaceOrderResponse = resp.json().await.map_err(Self::map_transport_error)?;
        Ok(PlaceAck {
            client_order_id: body.client_order_id,
            exchange_order_id: body.exchange_order_id,
            status: parse_status(&body.status),
            ts_ms: now_ms(),
        })
    }

    #[instrument(skip(self), fields(op = "cancel_order"))]
    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
        symbol: &str,
    ) -> Result<(), VenueError> {
        if client_order_id.is_none() && exchange_order_id.is_none() {
            return Err(VenueError::InvalidOrder(
                "cancel_order requires at least one of client_order_id/exchange_order_id".to_string(),
            ));
        }
        let resp = self
            .client
            .post(self.url("/orders/cancel"))
            .timeout(CALL_TIMEOUT)
            .json(&serde_json::json!({
                "client_order_id": client_order_id,
                "exchange_order_id": exchange_order_id,
                "symbol": symbol,
            }))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(op = "cancel_all"))]
    async fn cancel_all(&self, symbol: &str) -> Result<(), VenueError> {
        let resp = self
            .client
            .post(self.url("/orders/cancel_all"))
            .timeout(CALL_TIMEOUT)
            .json(&serde_json::json!({ "symbol": symbol }))
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(op = "get_open_orders"))]
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, VenueError> {
        let resp = self
            .client
            .get(self.url(&format!("/orders/open?symbol={symbol}")))
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }

        let body: Vec<OpenOrderResponse> = resp.json().await.map_err(Self::map_transport_error)?;
        Ok(body
            .into_iter()
            .map(|o| OpenOrder {
                client_order_id: o.client_order_id,
                exchange_order_id: o.exchange_order_id,
                side: parse_side(&o.side),
                price: o.price,
                size: o.size,
                filled_size: o.filled_size,
                created_at_ms: o.created_at_ms,
            })
            .collect())
    }

    #[instrument(skip(self), fields(op = "get_position"))]
    async fn get_position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError> {
        let resp = self
            .client
            .get(self.url(&format!("/positions?symbol={symbol}")))
            .timeout(CALL_TIMEOUT)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::map_error(resp).await);
        }

        let body: Option<PositionResponse> = resp.json().await.map_err(Self::map_transport_error)?;
        Ok(body.map(|p| VenuePosition { size: p.size, entry_px: p.entry_px }))
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
