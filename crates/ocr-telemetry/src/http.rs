//! A lightweight HTTP server exposing `/metrics` and `/health` (teacher's
//! `telemetry::http::run_server`, trimmed to this node's needs).

use axum::{
    body::Bytes,
    http::{header::CONTENT_TYPE, HeaderName},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use tokio::sync::watch;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(err) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(%err, "failed to encode prometheus metrics");
    }
    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buf.into(),
    )
}

async fn health_handler() -> &'static str {
    "OK"
}

pub async fn run_server(addr: SocketAddr, mut shutdown_rx: watch::Receiver<bool>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            tracing::error!(%err, "failed to bind telemetry http server");
            return;
        }
    };
    tracing::info!(%addr, "telemetry server listening");

    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
    });

    if let Err(err) = graceful.await {
        tracing::error!(%err, "telemetry server error");
    }
}
