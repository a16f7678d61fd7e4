//! Herald API: HTTP surface and composition root.
//!
//! Serves the notification log to pull-based consumers, accepts commands for
//! the sample Agile PM context, and wires the dispatcher chain and publisher
//! that run behind them.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full router over `state`.
pub fn app(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .merge(routes::notifications::router())
        .merge(routes::diagnostics::router())
        .nest("/api/v1/products", routes::products::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
