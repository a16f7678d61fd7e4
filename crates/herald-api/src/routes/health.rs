//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use herald_core::store::EventStore;
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// `up` when the store answers a trivial read.
    pub store: String,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, store) = match state.storage.max_global_sequence().await {
        Ok(_) => (StatusCode::OK, "up"),
        Err(err) => {
            warn!(error = %err, "health check could not reach the store");
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };
    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
    };
    (status, Json(body))
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
