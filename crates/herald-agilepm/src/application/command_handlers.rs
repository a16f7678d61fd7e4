//! Command handlers for the Agile PM context.
//!
//! Each handler loads the product, runs the command, and appends the
//! resulting events in one unit of work. A `ConcurrencyConflict` from the
//! store is returned to the caller; nothing here retries.

use std::sync::LazyLock;

use herald_core::aggregate::AggregateRoot;
use herald_core::catalog::EventCatalog;
use herald_core::clock::Clock;
use herald_core::error::DomainError;
use herald_core::event::{PendingEvent, StoredEvent};
use herald_core::store::EventStore;
use herald_core::stream::{EventStream, StreamId};
use herald_core::unit_of_work::UnitOfWork;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::Product;
use crate::domain::commands::{CreateProduct, PlanBacklogItem, RenameProduct};

static CATALOG: LazyLock<EventCatalog> = LazyLock::new(crate::catalog);

/// Result of planning a backlog item.
#[derive(Debug, Clone)]
pub struct PlannedBacklogItem {
    /// The new item's id.
    pub backlog_item_id: Uuid,
    /// Events appended by the command.
    pub events: Vec<StoredEvent>,
}

/// Loads a product from its full stream.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the product has no events,
/// or a store or catalog error.
pub(crate) async fn load<S: EventStore + ?Sized>(
    product_id: Uuid,
    store: &S,
) -> Result<Product, DomainError> {
    let stream = store.stream_for(&Product::stream_name(product_id), 0).await?;
    Product::reconstitute(product_id, &stream, &CATALOG)
}

async fn append_in(
    unit_of_work: &mut UnitOfWork,
    stream_id: &StreamId,
    events: Vec<PendingEvent>,
) -> Result<EventStream, DomainError> {
    unit_of_work.transaction()?.append(stream_id, events).await
}

async fn persist<S: EventStore + ?Sized>(
    product: &mut Product,
    correlation_id: Uuid,
    store: &S,
) -> Result<Vec<StoredEvent>, DomainError> {
    let pending = product
        .uncommitted_events()
        .iter()
        .map(|event| PendingEvent::from_domain_event(event, correlation_id))
        .collect::<Result<Vec<_>, _>>()?;
    let stream_id = product.stream_id();

    let mut unit_of_work = UnitOfWork::begun(store).await?;
    let appended = match append_in(&mut unit_of_work, &stream_id, pending).await {
        Ok(stream) => stream,
        Err(err) => return Err(unit_of_work.fail(err).await),
    };
    unit_of_work.success().await?;

    product.clear_uncommitted_events();
    debug!(
        stream = %stream_id,
        version = appended.version,
        appended = appended.events.len(),
        "product events appended"
    );
    Ok(appended.events)
}

/// Handles the `CreateProduct` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank name and
/// `DomainError::ConcurrencyConflict` if the product already exists.
pub async fn handle_create_product<S: EventStore + ?Sized>(
    command: &CreateProduct,
    clock: &dyn Clock,
    store: &S,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut product = Product::new(command.product_id);
    product.create(&command.name, &command.description, clock)?;
    persist(&mut product, command.correlation_id, store).await
}

/// Handles the `RenameProduct` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown product,
/// `DomainError::Validation` for a blank name, and
/// `DomainError::ConcurrencyConflict` if the product changed since it was
/// loaded.
pub async fn handle_rename_product<S: EventStore + ?Sized>(
    command: &RenameProduct,
    clock: &dyn Clock,
    store: &S,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut product = load(command.product_id, store).await?;
    product.rename(&command.name, clock)?;
    persist(&mut product, command.correlation_id, store).await
}

/// Handles the `PlanBacklogItem` command.
///
/// # Errors
///
/// As [`handle_rename_product`], with the summary validated instead of the
/// name.
pub async fn handle_plan_backlog_item<S: EventStore + ?Sized>(
    command: &PlanBacklogItem,
    clock: &dyn Clock,
    store: &S,
) -> Result<PlannedBacklogItem, DomainError> {
    let mut product = load(command.product_id, store).await?;
    let backlog_item_id = product.plan_backlog_item(&command.summary, clock)?;
    let events = persist(&mut product, command.correlation_id, store).await?;
    Ok(PlannedBacklogItem {
        backlog_item_id,
        events,
    })
}
