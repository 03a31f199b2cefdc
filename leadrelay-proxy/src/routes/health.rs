//! Health check and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::metrics::encode_metrics;
use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
///
/// Always 200; a database outage is reported in the body, not the status.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sink = state.dispatcher.worker().sink();
    let database = match sink.ping().await {
        Ok(()) => json!({ "backend": sink.name(), "status": "connected" }),
        Err(e) => json!({
            "backend": sink.name(),
            "status": "disconnected",
            "error": e.to_string()
        }),
    };

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "cpus": num_cpus::get(),
        "max_concurrent_calls": state.dispatcher.gate().capacity(),
        "upstream_mode": state.dispatcher.upstream().mode(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "database": database
    }))
}

/// GET /ping
pub async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

/// Metrics endpoint with gate, persistence and limiter statistics
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let gate = state.dispatcher.gate();
    let gate_snapshot = gate.metrics().snapshot();
    let persistence = state.dispatcher.worker().stats();

    Json(json!({
        "gate": {
            "capacity": gate.capacity(),
            "available": gate.available(),
            "totals": gate_snapshot
        },
        "persistence": persistence,
        "rate_limiter": {
            "rps": state.config.rate_limit.rps,
            "burst": state.config.rate_limit.burst,
            "tracked_clients": state.limiter.tracked_clients()
        },
        "upstream": {
            "mode": state.dispatcher.upstream().mode(),
            "request_timeout_secs": state.dispatcher.request_timeout().as_secs()
        }
    }))
}

/// Prometheus metrics endpoint
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        encode_metrics(),
    )
}

/// Ready check (for Kubernetes)
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.dispatcher.worker().sink().ping().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Live check (for Kubernetes)
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
