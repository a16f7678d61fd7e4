//! Read-only view of pipeline progress.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use herald_core::error::DomainError;
use herald_core::store::{CursorStore, EventStore, NotificationStore};
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Positions of the root dispatcher and the publisher against the feed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorsResponse {
    /// Root dispatcher cursor id.
    pub dispatcher_id: String,
    /// Last global sequence dispatched to every child.
    pub last_dispatched_global_sequence: i64,
    /// Highest global sequence in the feed.
    pub max_global_sequence: i64,
    /// Exchange served by the log and publisher.
    pub exchange_name: String,
    /// Notifications recorded for the exchange.
    pub notification_count: i64,
    /// Last notification confirmed sent to the broker.
    pub most_recent_published_notification_id: i64,
}

async fn read_cursors(state: &AppState) -> Result<CursorsResponse, DomainError> {
    let cursor = state.storage.dispatch_cursor(&state.dispatcher_id).await?;
    let tracker = state
        .storage
        .published_notification_tracker(&state.exchange_name)
        .await?;
    Ok(CursorsResponse {
        dispatcher_id: cursor.dispatcher_id,
        last_dispatched_global_sequence: cursor.last_dispatched_global_sequence,
        max_global_sequence: state.storage.max_global_sequence().await?,
        exchange_name: state.exchange_name.clone(),
        notification_count: state.storage.count_notifications(&state.exchange_name).await?,
        most_recent_published_notification_id: tracker.most_recent_published_notification_id,
    })
}

/// GET /diagnostics/cursors
#[instrument(skip(state))]
async fn cursors(State(state): State<AppState>) -> Result<Json<CursorsResponse>, ApiError> {
    Ok(Json(read_cursors(&state).await?))
}

/// Returns the diagnostics router.
pub fn router() -> Router<AppState> {
    Router::new().route("/diagnostics/cursors", get(cursors))
}
