//! Domain events for the Agile PM context.

use chrono::{DateTime, Utc};
use herald_core::catalog::{EventCatalog, EventSchema};
use herald_core::error::DomainError;
use herald_core::event::{DomainEvent, StoredEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type tag of [`ProductCreated`].
pub const PRODUCT_CREATED: &str = "agilepm.product_created";
/// Type tag of [`ProductRenamed`].
pub const PRODUCT_RENAMED: &str = "agilepm.product_renamed";
/// Type tag of [`BacklogItemPlanned`].
pub const BACKLOG_ITEM_PLANNED: &str = "agilepm.backlog_item_planned";

/// Schema version written for [`ProductCreated`].
pub const PRODUCT_CREATED_VERSION: i32 = 2;
/// Schema version written for [`ProductRenamed`].
pub const PRODUCT_RENAMED_VERSION: i32 = 1;
/// Schema version written for [`BacklogItemPlanned`].
pub const BACKLOG_ITEM_PLANNED_VERSION: i32 = 1;

/// Emitted when a product is created.
///
/// Schema v2; v1 carried no `description`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreated {
    /// The product identifier.
    pub product_id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Emitted when a product is renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRenamed {
    /// The product identifier.
    pub product_id: Uuid,
    /// The new name.
    pub name: String,
}

/// Emitted when a backlog item is planned for a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogItemPlanned {
    /// The owning product.
    pub product_id: Uuid,
    /// The new backlog item identifier.
    pub backlog_item_id: Uuid,
    /// One-line summary of the work.
    pub summary: String,
}

/// Event payload variants for the Agile PM context.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductEventKind {
    /// A product was created.
    ProductCreated(ProductCreated),
    /// A product was renamed.
    ProductRenamed(ProductRenamed),
    /// A backlog item was planned.
    BacklogItemPlanned(BacklogItemPlanned),
}

/// Domain event envelope for the Agile PM context.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductEvent {
    /// When the event happened.
    pub occurred_on: DateTime<Utc>,
    /// Event-specific payload.
    pub kind: ProductEventKind,
}

impl ProductEvent {
    /// Decodes a stored event through the catalog, upgrading older payloads.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` or `DomainError::VersionMismatch`
    /// from the catalog, or `DomainError::Serialization` for a malformed body.
    pub fn from_stored(catalog: &EventCatalog, stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind = match stored.event_type.as_str() {
            PRODUCT_CREATED => ProductEventKind::ProductCreated(catalog.decode(stored)?),
            PRODUCT_RENAMED => ProductEventKind::ProductRenamed(catalog.decode(stored)?),
            BACKLOG_ITEM_PLANNED => ProductEventKind::BacklogItemPlanned(catalog.decode(stored)?),
            other => return Err(DomainError::UnknownEventType(other.to_owned())),
        };
        Ok(Self {
            occurred_on: stored.occurred_on,
            kind,
        })
    }
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            ProductEventKind::ProductCreated(_) => PRODUCT_CREATED,
            ProductEventKind::ProductRenamed(_) => PRODUCT_RENAMED,
            ProductEventKind::BacklogItemPlanned(_) => BACKLOG_ITEM_PLANNED,
        }
    }

    fn event_version(&self) -> i32 {
        match &self.kind {
            ProductEventKind::ProductCreated(_) => PRODUCT_CREATED_VERSION,
            ProductEventKind::ProductRenamed(_) => PRODUCT_RENAMED_VERSION,
            ProductEventKind::BacklogItemPlanned(_) => BACKLOG_ITEM_PLANNED_VERSION,
        }
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        let payload = match &self.kind {
            ProductEventKind::ProductCreated(body) => serde_json::to_value(body)?,
            ProductEventKind::ProductRenamed(body) => serde_json::to_value(body)?,
            ProductEventKind::BacklogItemPlanned(body) => serde_json::to_value(body)?,
        };
        Ok(payload)
    }
}

#[allow(clippy::unnecessary_wraps)]
fn product_created_v1_to_v2(
    mut payload: serde_json::Value,
) -> Result<serde_json::Value, DomainError> {
    if let Some(body) = payload.as_object_mut() {
        body.entry("description")
            .or_insert_with(|| serde_json::Value::String(String::new()));
    }
    Ok(payload)
}

/// Every event type this context writes, with upgrade paths for older
/// schemas.
#[must_use]
pub fn catalog() -> EventCatalog {
    EventCatalog::new()
        .with_schema(
            EventSchema::new(PRODUCT_CREATED, PRODUCT_CREATED_VERSION)
                .with_upgrade(1, product_created_v1_to_v2),
        )
        .with_schema(EventSchema::new(PRODUCT_RENAMED, PRODUCT_RENAMED_VERSION))
        .with_schema(EventSchema::new(BACKLOG_ITEM_PLANNED, BACKLOG_ITEM_PLANNED_VERSION))
}
