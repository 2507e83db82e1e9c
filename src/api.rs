//! HTTP server for health, pending transactions and metrics

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use serde::Serialize;
use tracing::{error, info};

use crate::metrics;
use crate::orchestrator::{RelayHealth, RelayOrchestrator};
use crate::types::PendingTransaction;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayOrchestrator>,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub transactions: Vec<PendingTransaction>,
}

/// Full health status: counters, listener and dispatcher views
async fn health_check(State(state): State<AppState>) -> Json<RelayHealth> {
    Json(state.relay.health().await)
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Ready once the orchestrator runs and at least one listener is connected
async fn readiness(State(state): State<AppState>) -> Response {
    let any_connected = state
        .relay
        .hub()
        .health()
        .values()
        .any(|status| status.connected && !status.parked);
    if state.relay.is_running() && any_connected {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}

async fn pending(State(state): State<AppState>) -> Json<PendingResponse> {
    let transactions = state.relay.pending_transactions();
    Json(PendingResponse {
        count: transactions.len(),
        transactions,
    })
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let (content_type, buffer) = match metrics::render() {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }
    };

    match Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(relay: Arc<RelayOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/pending", get(pending))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { relay })
}

/// Start the HTTP server; runs until the listener fails
pub async fn start_server(bind_address: &str, relay: Arc<RelayOrchestrator>) -> eyre::Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}: {}", bind_address, e))?;

    info!("API server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /pending - Non-terminal transactions (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(relay)).await?;
    Ok(())
}
