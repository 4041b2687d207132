//! WebSocket market-data ingest (§6.1). Owns exactly one connection per
//! process, normalizes the venue's wire frames into [`MarketEvent`], and
//! reconnects with [`ReconnectBackoff`] on a gap-sensitive sequence break
//! or a dropped socket. Runs as its own `tokio` task, feeding the tick
//! loop over a bounded channel — it never mutates cache/tracker state
//! directly (§5).

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, instrument, warn};

use crate::resilience::{GapDetector, ReconnectBackoff};
use quant_strategy::Side;

use super::types::{MarketEvent, TradeKind};

/// Venue wire message shape. A real integration replaces this with
/// whatever the venue actually sends; the normalization step downstream
/// (`WsMarketDataIngest::normalize`) is where venue-specific parsing is
/// meant to be isolated.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Bbo {
        ts_ms: i64,
        seq: u64,
        bid_px: Decimal,
        bid_sz: Decimal,
        ask_px: Decimal,
        ask_sz: Decimal,
    },
    Trade {
        ts_ms: i64,
        seq: u64,
        px: Decimal,
        sz: Decimal,
        side: String,
        liquidation: bool,
    },
    Price {
        ts_ms: i64,
        seq: u64,
        mark_px: Option<Decimal>,
        index_px: Option<Decimal>,
    },
    Funding {
        ts_ms: i64,
        rate: Decimal,
    },
}

pub struct WsMarketDataIngest {
    url: String,
    symbol: String,
    book_gap: GapDetector,
    price_gap: GapDetector,
    backoff: ReconnectBackoff,
}

impl WsMarketDataIngest {
    pub fn new(url: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            symbol: symbol.into(),
            book_gap: GapDetector::new(),
            price_gap: GapDetector::new(),
            backoff: ReconnectBackoff::new(),
        }
    }

    /// Runs forever, reconnecting on error. Intended to be spawned as its
    /// own task; the caller observes progress only through `tx`.
    #[instrument(skip(self, tx), fields(symbol = %self.symbol))]
    pub async fn run(mut self, tx: mpsc::Sender<MarketEvent>) {
        loop {
            match self.connect_and_stream(&tx).await {
                Ok(()) => {
                    // Clean close: still reconnect, but don't treat it as a failure escalation.
                    self.backoff.reset();
                }
                Err(reason) => {
                    warn!(%reason, "market data stream disconnected");
                    let _ = tx.send(MarketEvent::Disconnected).await;
                }
            }

            let delay = self.backoff.next_delay();
            let _ = tx.send(MarketEvent::Reconnecting { reason: format!("retrying in {delay:?}") }).await;
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&mut self, tx: &mpsc::Sender<MarketEvent>) -> Result<(), String> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| e.to_string())?;
        info!("market data stream connected");
        let _ = tx.send(MarketEvent::Connected).await;
        self.backoff.reset();

        let (mut write, mut read) = ws_stream.split();
        let _ = write
            .send(Message::Text(
                serde_json::json!({ "op": "subscribe", "symbol": self.symbol }).to_string(),
            ))
            .await;

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| e.to_string())?;
            let Message::Text(text) = msg else { continue };

            let wire: WireMessage = match serde_json::from_str(&text) {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "unparseable market data frame, skipping");
                    continue;
                }
            };

            if let Some(event) = self.normalize(wire, tx).await {
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Translates one wire message into zero or one domain events,
    /// applying sequence-gap discipline along the way. Orderbook/mark/
    /// index gaps are forced reconnects (and emit `Reconnecting`); trade/
    /// funding gaps are logged only (§6.1).
    async fn normalize(&mut self, wire: WireMessage, tx: &mpsc::Sender<MarketEvent>) -> Option<MarketEvent> {
        match wire {
            WireMessage::Bbo { ts_ms, seq, bid_px, bid_sz, ask_px, ask_sz } => {
                if let Some(gap) = self.book_gap.check(seq) {
                    warn!(gap, "orderbook sequence gap detected, forcing reconnect");
                    self.book_gap.reset();
                    let _ = tx
                        .send(MarketEvent::Reconnecting { reason: format!("orderbook gap of {gap}") })
                        .await;
                    return None;
                }
                Some(MarketEvent::Bbo {
                    symbol: self.symbol.clone(),
                    ts_ms,
                    seq: Some(seq),
                    best_bid_px: bid_px,
                    best_bid_sz: bid_sz,
                    best_ask_px: ask_px,
                    best_ask_sz: ask_sz,
                })
            }
            WireMessage::Trade { ts_ms, seq, px, sz, side, liquidation } => {
                // Trade sequence gaps are logged only, never force a reconnect.
                let side = if side.eq_ignore_ascii_case("sell") { Side::Sell } else { Side::Buy };
                let kind = if liquidation { TradeKind::Liquidation } else { TradeKind::Normal };
                Some(MarketEvent::Trade {
                    symbol: self.symbol.clone(),
                    ts_ms,
                    seq: Some(seq),
                    px,
                    sz,
                    side,
                    kind,
                })
            }
            WireMessage::Price { ts_ms, seq, mark_px, index_px } => {
                if let Some(gap) = self.price_gap.check(seq) {
                    warn!(gap, "mark/index sequence gap detected, forcing reconnect");
                    self.price_gap.reset();
                    let _ = tx
                        .send(MarketEvent::Reconnecting { reason: format!("mark/index gap of {gap}") })
                        .await;
                    return None;
                }
                Some(MarketEvent::Price { symbol: self.symbol.clone(), ts_ms, seq: Some(seq), mark_px, index_px })
            }
            WireMessage::Funding { ts_ms, rate } => {
                Some(MarketEvent::Funding { symbol: self.symbol.clone(), ts_ms, rate })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bbo(seq: u64) -> WireMessage {
        WireMessage::Bbo { ts_ms: 0, seq, bid_px: dec!(100), bid_sz: dec!(1), ask_px: dec!(100.1), ask_sz: dec!(1) }
    }

    fn price(seq: u64) -> WireMessage {
        WireMessage::Price { ts_ms: 0, seq, mark_px: Some(dec!(100)), index_px: Some(dec!(100)) }
    }

    #[tokio::test]
    async fn bbo_and_price_sequences_are_tracked_independently() {
        let mut ingest = WsMarketDataIngest::new("wss://example.invalid", "BTC-PERP");
        let (tx, _rx) = mpsc::channel(16);

        // Interleaved streams, each internally consecutive but starting
        // from unrelated baselines: neither should read as a gap against
        // the other's sequence numbers.
        assert!(ingest.normalize(bbo(1), &tx).await.is_some());
        assert!(ingest.normalize(price(500), &tx).await.is_some());
        assert!(ingest.normalize(bbo(2), &tx).await.is_some());
        assert!(ingest.normalize(price(501), &tx).await.is_some());
        assert!(ingest.normalize(bbo(3), &tx).await.is_some());
    }

    #[tokio::test]
    async fn gap_in_one_stream_does_not_affect_the_other() {
        let mut ingest = WsMarketDataIngest::new("wss://example.invalid", "BTC-PERP");
        let (tx, _rx) = mpsc::channel(16);

        assert!(ingest.normalize(bbo(1), &tx).await.is_some());
        assert!(ingest.normalize(price(500), &tx).await.is_some());
        // A jump in the price stream forces a reconnect signal (None) but
        // must not disturb the book gap detector's independent baseline.
        assert!(ingest.normalize(price(510), &tx).await.is_none());
        assert!(ingest.normalize(bbo(2), &tx).await.is_some());
    }
}
