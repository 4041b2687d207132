//! HTTP exporter for [`super::Metrics`]: `/metrics` for Prometheus scrape,
//! `/healthz` for a supervisor's liveness probe. Same hyper 1.x
//! `TokioIo`/`service_fn` shape the teacher's `monitoring::server` uses.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::Metrics;
use crate::resilience::{HealthThresholds, HealthTracker};

/// Shared health state the server reads on every `/healthz` request. The
/// tick loop owns the write side via `Arc<Mutex<HealthTracker>>`.
#[derive(Clone)]
pub struct HealthHandle {
    pub tracker: Arc<Mutex<HealthTracker>>,
    pub thresholds: HealthThresholds,
}

/// Binds `addr` and serves `/metrics` and `/healthz` until the process
/// exits. Intended to be spawned as its own tokio task; a connection
/// error never tears down the server, only that one connection.
pub async fn serve(addr: SocketAddr, metrics: Arc<Metrics>, health: HealthHandle) -> Result<()> {
    let listener = TcpListener::bind(addr).await.context("failed to bind metrics server")?;
    info!(%addr, "metrics server listening");

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = %err, "metrics server failed to accept connection");
                continue;
            }
        };

        let metrics = metrics.clone();
        let health = health.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let metrics = metrics.clone();
                let health = health.clone();
                async move { handle(req, metrics, health).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(remote = %remote_addr, error = %err, "metrics connection closed with error");
            }
        });
    }
}

async fn handle(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    health: HealthHandle,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path();

    if path == "/healthz" || path == "/health" {
        let now_ms = now_ms();
        let status = health.tracker.lock().status(now_ms, &health.thresholds);
        let (code, body) = match status {
            crate::resilience::HealthStatus::Ok => (StatusCode::OK, "ok"),
            crate::resilience::HealthStatus::Degraded => (StatusCode::OK, "degraded"),
            crate::resilience::HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        };
        return Ok(Response::builder().status(code).body(Full::new(Bytes::from(body))).unwrap());
    }

    if path == "/metrics" {
        return Ok(match encode(&metrics) {
            Ok(text) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(text)))
                .unwrap(),
            Err(err) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(format!("failed to encode metrics: {err}"))))
                .unwrap(),
        });
    }

    Ok(Response::builder().status(StatusCode::NOT_FOUND).body(Full::new(Bytes::from("not found"))).unwrap())
}

fn encode(metrics: &Metrics) -> Result<String> {
    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).context("failed to encode prometheus metrics")?;
    String::from_utf8(buffer).context("metrics encoding produced invalid utf-8")
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_prometheus_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.ticks_total.inc();
        let text = encode(&metrics).unwrap();
        assert!(text.contains("qmm_ticks_total"));
        assert!(text.contains("# TYPE"));
    }
}
