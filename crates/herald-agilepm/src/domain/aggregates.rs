//! Aggregate roots for the Agile PM context.

use herald_core::aggregate::AggregateRoot;
use herald_core::catalog::EventCatalog;
use herald_core::clock::Clock;
use herald_core::error::DomainError;
use herald_core::stream::{EventStream, StreamId};
use uuid::Uuid;

use super::events::{
    BacklogItemPlanned, ProductCreated, ProductEvent, ProductEventKind, ProductRenamed,
};

/// Stream kind prefix; product streams are named `Product:{id}`.
pub const PRODUCT_STREAM_KIND: &str = "Product";

/// The aggregate root for a product and its backlog.
#[derive(Debug)]
pub struct Product {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (events applied).
    pub(crate) version: i64,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) backlog_item_ids: Vec<Uuid>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<ProductEvent>,
}

impl Product {
    /// A product with no history. Call [`Product::create`] to give it one.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            name: String::new(),
            description: String::new(),
            backlog_item_ids: Vec::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// The stream name for product `id`.
    #[must_use]
    pub fn stream_name(id: Uuid) -> String {
        format!("{PRODUCT_STREAM_KIND}:{id}")
    }

    /// Rebuilds a product from its full event stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an empty stream, or any
    /// catalog error decoding an event.
    pub fn reconstitute(
        id: Uuid,
        stream: &EventStream,
        catalog: &EventCatalog,
    ) -> Result<Self, DomainError> {
        if stream.is_new() {
            return Err(DomainError::AggregateNotFound(Self::stream_name(id)));
        }
        let mut product = Self::new(id);
        for stored in &stream.events {
            product.apply(&ProductEvent::from_stored(catalog, stored)?);
        }
        Ok(product)
    }

    /// The current name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Planned backlog items, oldest first.
    #[must_use]
    pub fn backlog_item_ids(&self) -> &[Uuid] {
        &self.backlog_item_ids
    }

    fn exists(&self) -> bool {
        self.version > 0 || !self.uncommitted_events.is_empty()
    }

    fn record(&mut self, clock: &dyn Clock, kind: ProductEventKind) {
        let event = ProductEvent {
            occurred_on: clock.now(),
            kind,
        };
        self.apply_state(&event);
        self.uncommitted_events.push(event);
    }

    /// Creates the product, producing a `ProductCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is blank or the product
    /// already has history.
    pub fn create(
        &mut self,
        name: &str,
        description: &str,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.exists() {
            return Err(DomainError::Validation(format!(
                "product {} already exists",
                self.id
            )));
        }
        let name = required("name", name)?;
        self.record(
            clock,
            ProductEventKind::ProductCreated(ProductCreated {
                product_id: self.id,
                name,
                description: description.trim().to_owned(),
            }),
        );
        Ok(())
    }

    /// Renames the product, producing a `ProductRenamed` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is blank.
    pub fn rename(&mut self, name: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        let name = required("name", name)?;
        self.record(
            clock,
            ProductEventKind::ProductRenamed(ProductRenamed {
                product_id: self.id,
                name,
            }),
        );
        Ok(())
    }

    /// Plans a backlog item, producing a `BacklogItemPlanned` event.
    /// Returns the new item's id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the summary is blank.
    pub fn plan_backlog_item(
        &mut self,
        summary: &str,
        clock: &dyn Clock,
    ) -> Result<Uuid, DomainError> {
        let summary = required("summary", summary)?;
        let backlog_item_id = Uuid::now_v7();
        self.record(
            clock,
            ProductEventKind::BacklogItemPlanned(BacklogItemPlanned {
                product_id: self.id,
                backlog_item_id,
                summary,
            }),
        );
        Ok(backlog_item_id)
    }

    fn apply_state(&mut self, event: &ProductEvent) {
        match &event.kind {
            ProductEventKind::ProductCreated(payload) => {
                self.name.clone_from(&payload.name);
                self.description.clone_from(&payload.description);
            }
            ProductEventKind::ProductRenamed(payload) => {
                self.name.clone_from(&payload.name);
            }
            ProductEventKind::BacklogItemPlanned(payload) => {
                self.backlog_item_ids.push(payload.backlog_item_id);
            }
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_owned())
}

impl AggregateRoot for Product {
    type Event = ProductEvent;

    fn stream_id(&self) -> StreamId {
        StreamId::for_aggregate(PRODUCT_STREAM_KIND, self.id, self.version)
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.apply_state(event);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::event::DomainEvent;
    use herald_test_support::FixedClock;

    #[test]
    fn test_create_produces_product_created_event() {
        // Arrange
        let product_id = Uuid::new_v4();
        let clock = FixedClock::standard();
        let mut product = Product::new(product_id);

        // Act
        product.create(" Herald ", "Notifications", &clock).unwrap();

        // Assert
        let events = product.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "agilepm.product_created");
        assert_eq!(events[0].occurred_on, clock.0);
        match &events[0].kind {
            ProductEventKind::ProductCreated(payload) => {
                assert_eq!(payload.product_id, product_id);
                assert_eq!(payload.name, "Herald");
            }
            other => panic!("expected ProductCreated, got {other:?}"),
        }
        assert_eq!(product.name(), "Herald");
        assert_eq!(product.version(), 0);
        assert_eq!(
            product.stream_id(),
            StreamId::new(format!("Product:{product_id}"), 0)
        );
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let clock = FixedClock::standard();
        let mut product = Product::new(Uuid::new_v4());
        product.create("Herald", "", &clock).unwrap();

        let result = product.create("Again", "", &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(product.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let mut product = Product::new(Uuid::new_v4());

        let result = product.create("   ", "", &FixedClock::standard());

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(product.uncommitted_events().is_empty());
    }

    #[test]
    fn test_rename_and_plan_update_state_in_order() {
        let clock = FixedClock::standard();
        let mut product = Product::new(Uuid::new_v4());
        product.create("Herald", "", &clock).unwrap();

        product.rename("Herald 2", &clock).unwrap();
        let item = product.plan_backlog_item("Ship it", &clock).unwrap();

        assert_eq!(product.name(), "Herald 2");
        assert_eq!(product.backlog_item_ids(), &[item]);
        let types: Vec<&str> = product
            .uncommitted_events()
            .iter()
            .map(DomainEvent::event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "agilepm.product_created",
                "agilepm.product_renamed",
                "agilepm.backlog_item_planned"
            ]
        );
    }

    #[test]
    fn test_reconstitute_empty_stream_is_not_found() {
        let id = Uuid::new_v4();

        let result = Product::reconstitute(
            id,
            &EventStream::empty(Product::stream_name(id)),
            &crate::catalog(),
        );

        match result {
            Err(DomainError::AggregateNotFound(name)) => assert_eq!(name, format!("Product:{id}")),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }
}
