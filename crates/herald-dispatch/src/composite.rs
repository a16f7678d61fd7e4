//! Composite child dispatcher.

use std::sync::Arc;

use async_trait::async_trait;

use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::event::StoredEvent;
use herald_core::store::StoreTransaction;

/// Groups several dispatchers behind one registration, e.g. all read-model
/// projections of a context. Children see events in registration order; the
/// first failure stops the rest.
pub struct CompositeDispatcher {
    name: String,
    children: Vec<Arc<dyn EventDispatcher>>,
}

impl CompositeDispatcher {
    /// Creates an empty composite.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Number of registered children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if no children are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl EventDispatcher for CompositeDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn understands(&self, event: &StoredEvent) -> bool {
        self.children.iter().any(|child| child.understands(event))
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        for child in &self.children {
            if child.understands(event) {
                child.dispatch(event, transaction).await?;
            }
        }
        Ok(())
    }

    fn register_event_dispatcher(
        &mut self,
        child: Arc<dyn EventDispatcher>,
    ) -> Result<(), DomainError> {
        self.children.push(child);
        Ok(())
    }
}
