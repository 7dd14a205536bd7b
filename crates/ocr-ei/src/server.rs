//! Binds the two listeners (spec §4.I): the public, authenticated surface
//! and the loopback-only `/runs` surface. Layer stack: load-shed,
//! concurrency limit, timeout, panic-catch, tracing, body-limit.

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tower::{limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::require_credentials;
use crate::config::EiConfig;
use crate::handlers::{create_job, delete_job, health, submit_run};
use crate::AppState;

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn run_server(
    config: EiConfig,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let public = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id", delete(delete_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_credentials,
        ))
        .route("/health", get(health))
        .with_state(state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(64))
                .layer(TimeoutLayer::new(Duration::from_secs(5))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes));

    let loopback = Router::new()
        .route("/runs", post(submit_run))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(64))
                .layer(TimeoutLayer::new(Duration::from_secs(5))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes));

    let public_addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let loopback_addr: SocketAddr = config
        .loopback_listen_addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let public_listener = tokio::net::TcpListener::bind(public_addr).await?;
    let loopback_listener = tokio::net::TcpListener::bind(loopback_addr).await?;

    tracing::info!(%public_addr, %loopback_addr, "external-initiator surface listening");

    let mut public_shutdown = shutdown_rx.clone();
    let public_server = axum::serve(public_listener, public).with_graceful_shutdown(async move {
        public_shutdown.changed().await.ok();
    });
    let loopback_server = axum::serve(loopback_listener, loopback).with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
    });

    let (public_res, loopback_res) = tokio::join!(public_server, loopback_server);
    public_res?;
    loopback_res?;
    Ok(())
}
