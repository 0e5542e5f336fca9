//! Swarm Gateway Proxy
//!
//! Single-binary Rust service that:
//! 1. Exposes a curated subset of a Bee node's API (content up/downloads)
//! 2. Stamps uploads with a managed postage batch
//! 3. Keeps that batch supply alive in the background (autobuy/autoextend)
//! 4. Optionally reuploads pinned content the network has lost

mod config;
mod error;
mod metrics;
mod proxy;
mod readiness;
mod reupload;
mod service;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bee_api::{BeeClient, BeeDebugClient};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use postage_stamps::StampsManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::proxy::ProxyState;
use crate::readiness::check_readiness;
use crate::reupload::ContentReuploader;
use crate::service::{BackgroundJobs, DRAIN_TIMEOUT, ServiceMetrics};

/// How often a fresh batch is polled until the node reports it usable
const USABLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    metrics: ServiceMetrics,
    stamps: Arc<StampsManager>,
    node: BeeDebugClient,
    auth_secret: Option<Arc<Secret<String>>>,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Every route, the fallback proxy included, sits behind the authorization
/// check and a concurrency limit of `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/readiness", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting gateway-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let mode = config
        .stamps
        .management_mode()
        .context("invalid [stamps] configuration")?;

    info!(
        listen_addr = %config.proxy.listen_addr,
        bee_api_url = %config.proxy.bee_api_url,
        bee_debug_api_url = %config.proxy.bee_debug_api_url,
        stamp_mode = mode.label(),
        reupload = config.reupload.enabled,
        auth = config.proxy.auth_secret.is_some(),
        "configuration loaded"
    );

    let timeout = Duration::from_secs(config.proxy.timeout_secs);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;

    let node = BeeDebugClient::new(client.clone(), config.proxy.bee_debug_api_url.clone())
        .with_usable_wait(USABLE_POLL_INTERVAL, config.stamps.usable_timeout());
    let stamps = Arc::new(StampsManager::new(mode, Arc::new(node.clone())));

    let mut jobs = BackgroundJobs::new(CancellationToken::new());
    jobs.push(stamps.start(jobs.token()));
    if config.reupload.enabled {
        let reuploader = Arc::new(ContentReuploader::new(BeeClient::new(
            client.clone(),
            config.proxy.bee_api_url.clone(),
        )));
        let period = Duration::from_secs(config.reupload.period_secs);
        jobs.push(Some(reuploader.start(period, jobs.token())));
    }
    info!(jobs = jobs.count(), "background jobs started");

    let metrics = ServiceMetrics::new();

    let proxy_state = ProxyState {
        client,
        upstream_url: config.proxy.bee_api_url.clone(),
        stamps: stamps.clone(),
        remove_pin_header: config.proxy.remove_pin_header,
        max_body_bytes: config.proxy.max_body_bytes,
        timeout,
        metrics: metrics.clone(),
    };

    let app_state = AppState {
        proxy: proxy_state,
        metrics: metrics.clone(),
        stamps,
        node,
        auth_secret: config.proxy.auth_secret.map(Arc::new),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.proxy.max_connections);

    let listen_addr = config.proxy.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race the drain against
    // the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Stop refresh loops from starting new cycles before draining requests
    jobs.cancel();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, jobs.shutdown())
        .await
        .is_err()
    {
        warn!("background job still running at shutdown, abandoning it");
    }

    info!("shutdown complete");
    Ok(())
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Reject requests whose `authorization` header does not carry the
/// configured secret. A no-op when no secret is configured.
async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(secret) = &state.auth_secret {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        if !secret.matches(presented) {
            warn!(path = %request.uri().path(), "rejected request with invalid authorization");
            return proxy::error_response(&error::Error::Forbidden, &new_request_id());
        }
    }
    next.run(request).await
}

/// Liveness: JSON with uptime, request counters and the stamp mode.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "stamp_mode": state.stamps.mode().label(),
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Readiness: 200 `OK`, 503 `NO_STAMP`, or 502 when the node is unhealthy.
async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = check_readiness(&state.stamps, &state.node).await;
    (status.status_code(), status.as_str())
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler: proxies routed Bee endpoints, 404 for the rest.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().to_string();
    let started = Instant::now();

    let response = proxy::proxy_request(&state.proxy, request, new_request_id()).await;

    metrics::record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
