//! Private-stream ingest (§6.2): the venue's per-account channel carrying
//! fills and order-state transitions. Structurally the sibling of
//! [`super::ws::WsMarketDataIngest`] — its own connection, its own
//! [`ReconnectBackoff`], normalizing wire frames into [`PrivateEvent`] and
//! feeding the tick loop over a bounded channel. Unlike the market-data
//! stream, a gap here is not sequence-tracked: fills and order updates are
//! each self-contained records, and the periodic venue-truth reconcile
//! (§4.8) is what catches anything a dropped message would have reported.

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, instrument, warn};

use crate::resilience::ReconnectBackoff;
use quant_strategy::Side;

use super::types::{Liquidity, OrderStatus, PrivateEvent};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Fill {
        client_order_id: String,
        exchange_order_id: String,
        side: String,
        price: Decimal,
        size: Decimal,
        fee: Decimal,
        liquidity: String,
    },
    OrderUpdate {
        client_order_id: String,
        exchange_order_id: Option<String>,
        status: String,
        reason: Option<String>,
    },
}

fn parse_side(s: &str) -> Side {
    if s.eq_ignore_ascii_case("sell") {
        Side::Sell
    } else {
        Side::Buy
    }
}

fn parse_liquidity(s: &str) -> Liquidity {
    if s.eq_ignore_ascii_case("taker") {
        Liquidity::Taker
    } else {
        Liquidity::Maker
    }
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

fn normalize(wire: WireMessage) -> PrivateEvent {
    match wire {
        WireMessage::Fill { client_order_id, exchange_order_id, side, price, size, fee, liquidity } => {
            PrivateEvent::Fill {
                client_order_id,
                exchange_order_id,
                side: parse_side(&side),
                price,
                size,
                fee,
                liquidity: parse_liquidity(&liquidity),
            }
        }
        WireMessage::OrderUpdate { client_order_id, exchange_order_id, status, reason } => {
            PrivateEvent::OrderUpdate { client_order_id, exchange_order_id, status: parse_status(&status), reason }
        }
    }
}

pub struct WsPrivateStreamIngest {
    url: String,
    symbol: String,
    backoff: ReconnectBackoff,
}

impl WsPrivateStreamIngest {
    pub fn new(url: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self { url: url.into(), symbol: symbol.into(), backoff: ReconnectBackoff::new() }
    }

    /// Runs forever, reconnecting on error. Intended to be spawned as its
    /// own task; the caller observes progress only through `tx`.
    #[instrument(skip(self, tx), fields(symbol = %self.symbol))]
    pub async fn run(mut self, tx: mpsc::Sender<PrivateEvent>) {
        loop {
            if let Err(reason) = self.connect_and_stream(&tx).await {
                warn!(%reason, "private stream disconnected");
            }
            let delay = self.backoff.next_delay();
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&mut self, tx: &mpsc::Sender<PrivateEvent>) -> Result<(), String> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await.map_err(|e| e.to_string())?;
        info!("private stream connected");
        self.backoff.reset();

        let (mut write, mut read) = ws_stream.split();
        let _ = write
            .send(Message::Text(
                serde_json::json!({ "op": "subscribe_private", "symbol": self.symbol }).to_string(),
            ))
            .await;

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| e.to_string())?;
            let Message::Text(text) = msg else { continue };

            let wire: WireMessage = match serde_json::from_str(&text) {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "unparseable private stream frame, skipping");
                    continue;
                }
            };

            if tx.send(normalize(wire)).await.is_err() {
                return Ok(());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_fill_wire_message() {
        let wire = WireMessage::Fill {
            client_order_id: "c1".to_string(),
            exchange_order_id: "ex1".to_string(),
            side: "buy".to_string(),
            price: dec!(100),
            size: dec!(1),
            fee: dec!(0.01),
            liquidity: "maker".to_string(),
        };
        match normalize(wire) {
            PrivateEvent::Fill { client_order_id, side, liquidity, .. } => {
                assert_eq!(client_order_id, "c1");
                assert_eq!(side, Side::Buy);
                assert_eq!(liquidity, Liquidity::Maker);
            }
            other => panic!("expected Fill, got {other:?}"),
        }
    }

    #[test]
    fn normalizes_order_update_wire_message() {
        let wire = WireMessage::OrderUpdate {
            client_order_id: "c1".to_string(),
            exchange_order_id: Some("ex1".to_string()),
            status: "cancelled".to_string(),
            reason: None,
        };
        match normalize(wire) {
            PrivateEvent::OrderUpdate { status, .. } => assert_eq!(status, OrderStatus::Cancelled),
            other => panic!("expected OrderUpdate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_falls_back_to_pending() {
        assert_eq!(parse_status("weird"), OrderStatus::Pending);
    }
}
