//! Notification log resource for pull-based consumers.
//!
//! `GET /notifications` serves the current page, which may still grow, so
//! it is cacheable for a minute. `GET /notifications/{low},{high}` serves a
//! specific page; archived pages never change and are cacheable for an hour.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use herald_core::notification::{Notification, NotificationLog, NotificationLogId};
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

const CURRENT_MAX_AGE_SECS: u32 = 60;
const ARCHIVED_MAX_AGE_SECS: u32 = 3600;

/// Hypermedia link to another log page.
#[derive(Debug, Serialize)]
pub struct Link {
    /// Path of the linked page.
    pub href: String,
    /// `self`, `next` or `previous`.
    pub rel: &'static str,
}

impl Link {
    fn to(rel: &'static str, id: NotificationLogId) -> Self {
        Self {
            href: format!("/notifications/{}", id.encoded()),
            rel,
        }
    }
}

/// Wire representation of one log page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLogRepresentation {
    /// `"low,high"` id of the page.
    pub id: String,
    /// `true` once the page is full and immutable.
    pub archived: bool,
    /// Notifications on the page in id order.
    pub notifications: Vec<Notification>,
    /// Link to this page.
    pub link_self: Link,
    /// Link to the following page, once this page is archived.
    pub link_next: Option<Link>,
    /// Link to the preceding page.
    pub link_previous: Option<Link>,
}

impl From<NotificationLog> for NotificationLogRepresentation {
    fn from(log: NotificationLog) -> Self {
        Self {
            id: log.id.encoded(),
            archived: log.archived,
            link_self: Link::to("self", log.id),
            link_next: log.next.map(|id| Link::to("next", id)),
            link_previous: log.previous.map(|id| Link::to("previous", id)),
            notifications: log.notifications,
        }
    }
}

fn cached(max_age_secs: u32, log: NotificationLog) -> Response {
    (
        [(header::CACHE_CONTROL, format!("max-age={max_age_secs}"))],
        Json(NotificationLogRepresentation::from(log)),
    )
        .into_response()
}

/// GET /notifications
#[instrument(skip(state), fields(exchange = %state.exchange_name))]
async fn current_notification_log(State(state): State<AppState>) -> Result<Response, ApiError> {
    let log = state.notification_logs.current_notification_log().await?;
    Ok(cached(CURRENT_MAX_AGE_SECS, log))
}

/// GET /notifications/{low},{high}
#[instrument(skip(state), fields(exchange = %state.exchange_name))]
async fn notification_log(
    State(state): State<AppState>,
    Path(notification_log_id): Path<String>,
) -> Result<Response, ApiError> {
    let id: NotificationLogId = notification_log_id.parse()?;
    let log = state.notification_logs.notification_log(id).await?;
    let max_age = if log.archived {
        ARCHIVED_MAX_AGE_SECS
    } else {
        CURRENT_MAX_AGE_SECS
    };
    Ok(cached(max_age, log))
}

/// Returns the router for the notification log.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(current_notification_log))
        .route("/notifications/{notification_log_id}", get(notification_log))
}
