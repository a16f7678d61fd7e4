//! Query handlers for the Agile PM context.
//!
//! This module contains query handlers that reconstitute aggregates
//! from stored events and return read-only view DTOs.

use herald_core::aggregate::AggregateRoot;
use herald_core::error::DomainError;
use herald_core::store::EventStore;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;

/// Read-only view of a product aggregate.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    /// The product identifier.
    pub product_id: Uuid,
    /// Current name.
    pub name: String,
    /// Current description.
    pub description: String,
    /// Planned backlog items, oldest first.
    pub backlog_item_ids: Vec<Uuid>,
    /// Current stream version.
    pub version: i64,
}

/// Retrieves a product by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID,
/// or a catalog error if a stored event cannot be read.
pub async fn get_product_by_id<S: EventStore + ?Sized>(
    product_id: Uuid,
    store: &S,
) -> Result<ProductView, DomainError> {
    let product = command_handlers::load(product_id, store).await?;
    Ok(ProductView {
        product_id,
        name: product.name().to_owned(),
        description: product.description().to_owned(),
        backlog_item_ids: product.backlog_item_ids().to_vec(),
        version: product.version(),
    })
}
