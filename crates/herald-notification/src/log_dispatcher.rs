//! Child dispatcher that records events as notifications.

use async_trait::async_trait;
use tracing::debug;

use herald_core::catalog::EventCatalog;
use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::event::StoredEvent;
use herald_core::store::StoreTransaction;

/// Appends every understood event to its exchange's notification log,
/// inside the root's tick transaction.
///
/// Recording is keyed on the event's global sequence, so a redelivered
/// batch never numbers an event twice.
pub struct NotificationLogDispatcher {
    exchange_name: String,
    catalog: Option<EventCatalog>,
}

impl NotificationLogDispatcher {
    /// Records every event.
    #[must_use]
    pub fn new(exchange_name: impl Into<String>) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            catalog: None,
        }
    }

    /// Records only event types registered in `catalog`.
    #[must_use]
    pub fn with_catalog(mut self, catalog: EventCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }
}

#[async_trait]
impl EventDispatcher for NotificationLogDispatcher {
    fn name(&self) -> &'static str {
        "notification-log"
    }

    fn understands(&self, event: &StoredEvent) -> bool {
        self.catalog
            .as_ref()
            .is_none_or(|catalog| catalog.knows(&event.event_type))
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        match transaction
            .append_notification(&self.exchange_name, event)
            .await?
        {
            Some(notification) => debug!(
                exchange = %self.exchange_name,
                notification_id = notification.notification_id,
                global_sequence = event.global_sequence,
                "recorded notification"
            ),
            None => debug!(
                exchange = %self.exchange_name,
                global_sequence = event.global_sequence,
                "notification already recorded"
            ),
        }
        Ok(())
    }
}
