//! HTTP API for health checks, Prometheus metrics and loop status

use agent_lib::{
    controller::ControllerStatus,
    health::{ComponentStatus, HealthRegistry},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub status: watch::Receiver<ControllerStatus>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, status: watch::Receiver<ControllerStatus>) -> Self {
        Self {
            health_registry,
            status,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // still retrying
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Latest poll loop snapshot
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.status.borrow().clone();
    Json(snapshot)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve on localhost until `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("127.0.0.1:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
