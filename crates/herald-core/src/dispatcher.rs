//! Event dispatcher capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::StoredEvent;
use crate::store::StoreTransaction;

/// A sink in the dispatcher chain.
///
/// The root dispatcher hands each undispatched event to every registered
/// child that `understands` it. Children run inside the root's tick
/// transaction and must not commit it. Events may be redelivered after a
/// failed tick, so `dispatch` must be idempotent.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Returns `true` if this dispatcher wants `event`.
    fn understands(&self, event: &StoredEvent) -> bool;

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error aborts the root's whole batch; the batch is retried on the
    /// next tick.
    async fn dispatch(
        &self,
        event: &StoredEvent,
        transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError>;

    /// Registers a downstream dispatcher. Leaf dispatchers refuse.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if this dispatcher has no children.
    fn register_event_dispatcher(
        &mut self,
        child: Arc<dyn EventDispatcher>,
    ) -> Result<(), DomainError> {
        Err(DomainError::Validation(format!(
            "{} cannot register additional dispatchers (refused {})",
            self.name(),
            child.name()
        )))
    }
}
