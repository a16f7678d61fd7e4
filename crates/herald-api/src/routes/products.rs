//! Routes for the Agile PM bounded context.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use herald_agilepm::application::command_handlers;
use herald_agilepm::application::query_handlers::{self, ProductView};
use herald_agilepm::domain::commands;
use herald_core::event::StoredEvent;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    /// Optional client-chosen id; one is generated when absent.
    pub product_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Request body for POST /{id}/rename.
#[derive(Debug, Deserialize)]
pub struct RenameProductRequest {
    /// The new name.
    pub name: String,
}

/// Request body for POST /{id}/backlog-items.
#[derive(Debug, Deserialize)]
pub struct PlanBacklogItemRequest {
    /// One-line summary of the work.
    pub summary: String,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// The product the command applied to.
    pub product_id: Uuid,
    /// The backlog item created, for backlog commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlog_item_id: Option<Uuid>,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

fn event_ids(events: &[StoredEvent]) -> Vec<Uuid> {
    events.iter().map(|e| e.event_id).collect()
}

/// POST /
#[instrument(skip(state, request))]
async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateProduct {
        correlation_id: Uuid::new_v4(),
        product_id: request.product_id.unwrap_or_else(Uuid::now_v7),
        name: request.name,
        description: request.description,
    };

    info!(
        correlation_id = %command.correlation_id,
        product_id = %command.product_id,
        "handling create_product command"
    );

    let stored_events = command_handlers::handle_create_product(
        &command,
        state.clock.as_ref(),
        state.storage.as_ref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse {
            product_id: command.product_id,
            backlog_item_id: None,
            event_ids: event_ids(&stored_events),
        }),
    ))
}

/// POST /{id}/rename
#[instrument(skip(state, request))]
async fn rename_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<RenameProductRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RenameProduct {
        correlation_id: Uuid::new_v4(),
        product_id,
        name: request.name,
    };

    info!(correlation_id = %command.correlation_id, "handling rename_product command");

    let stored_events = command_handlers::handle_rename_product(
        &command,
        state.clock.as_ref(),
        state.storage.as_ref(),
    )
    .await?;

    Ok(Json(CommandResponse {
        product_id,
        backlog_item_id: None,
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/backlog-items
#[instrument(skip(state, request))]
async fn plan_backlog_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<PlanBacklogItemRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::PlanBacklogItem {
        correlation_id: Uuid::new_v4(),
        product_id,
        summary: request.summary,
    };

    info!(correlation_id = %command.correlation_id, "handling plan_backlog_item command");

    let planned = command_handlers::handle_plan_backlog_item(
        &command,
        state.clock.as_ref(),
        state.storage.as_ref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse {
            product_id,
            backlog_item_id: Some(planned.backlog_item_id),
            event_ids: event_ids(&planned.events),
        }),
    ))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProductView>, ApiError> {
    let view = query_handlers::get_product_by_id(product_id, state.storage.as_ref()).await?;
    Ok(Json(view))
}

/// Returns the router for the Agile PM context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/{id}", get(get_product))
        .route("/{id}/rename", post(rename_product))
        .route("/{id}/backlog-items", post(plan_backlog_item))
}
