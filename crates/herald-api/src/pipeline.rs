//! Wiring of the background dispatch and publish pipeline.

use std::sync::Arc;
use std::time::Duration;

use herald_core::broker::MessageProducer;
use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::store::Storage;
use herald_dispatch::{CompositeDispatcher, EventBusDispatcher, EventStoreDispatcher, Scheduler};
use herald_notification::{NotificationLogDispatcher, NotificationPublisher};

/// Capacity of the in-process event bus.
const EVENT_BUS_CAPACITY: usize = 1024;

/// The root dispatcher, its children and the publisher for one exchange.
///
/// The root records every Agile PM event in the exchange's notification log
/// and republishes it on the in-process bus; the publisher then pushes the
/// log to the broker.
pub struct Pipeline {
    /// Root dispatcher over the event feed.
    pub root: Arc<EventStoreDispatcher>,
    /// Broker publisher for the exchange.
    pub publisher: Arc<NotificationPublisher>,
    /// In-process subscribers to dispatched events.
    pub bus: Arc<EventBusDispatcher>,
}

impl Pipeline {
    /// Assembles the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a dispatcher refuses a child.
    pub fn new(
        storage: &Arc<dyn Storage>,
        producer: Arc<dyn MessageProducer>,
        exchange_name: &str,
        dispatcher_id: &str,
        publish_batch_size: i64,
    ) -> Result<Self, DomainError> {
        let bus = Arc::new(EventBusDispatcher::new(EVENT_BUS_CAPACITY));

        let mut children = CompositeDispatcher::new(format!("{exchange_name}.children"));
        children.register_event_dispatcher(Arc::new(
            NotificationLogDispatcher::new(exchange_name).with_catalog(herald_agilepm::catalog()),
        ))?;
        children.register_event_dispatcher(Arc::clone(&bus) as Arc<dyn EventDispatcher>)?;

        let mut root = EventStoreDispatcher::new(dispatcher_id, Arc::clone(storage));
        root.register_event_dispatcher(Arc::new(children))?;

        let publisher = NotificationPublisher::new(
            exchange_name,
            Arc::clone(storage),
            producer,
            publish_batch_size,
        );

        Ok(Self {
            root: Arc::new(root),
            publisher: Arc::new(publisher),
            bus,
        })
    }

    /// A scheduler that dispatches and then publishes on every tick.
    #[must_use]
    pub fn scheduler(&self, interval: Duration) -> Scheduler {
        Scheduler::new(interval)
            .with_task(Arc::clone(&self.root) as _)
            .with_task(Arc::clone(&self.publisher) as _)
    }
}

#[cfg(test)]
mod tests {
    use herald_core::store::{CursorStore, EventStore};
    use herald_core::stream::StreamId;
    use herald_event_store::InMemoryStore;
    use herald_test_support::{RecordingBroker, pending_event};

    use super::*;

    #[tokio::test]
    async fn test_tick_records_notifies_and_publishes() {
        // Arrange
        let store: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let broker = Arc::new(RecordingBroker::new());
        let pipeline =
            Pipeline::new(&store, broker.clone(), "herald.agilepm", "root", 100).unwrap();
        let mut bus = pipeline.bus.subscribe();
        store
            .append(
                &StreamId::new("Product:1", 0),
                vec![
                    pending_event("agilepm.product_created"),
                    pending_event("billing.invoice_sent"),
                ],
            )
            .await
            .unwrap();

        // Act
        pipeline.scheduler(Duration::from_secs(1)).tick().await;

        // Assert
        assert_eq!(broker.sent_message_ids(), vec!["1"]);
        assert_eq!(
            store
                .dispatch_cursor("root")
                .await
                .unwrap()
                .last_dispatched_global_sequence,
            2
        );
        assert_eq!(
            store
                .published_notification_tracker("herald.agilepm")
                .await
                .unwrap()
                .most_recent_published_notification_id,
            1
        );
        assert_eq!(bus.recv().await.unwrap().global_sequence, 1);
    }
}
