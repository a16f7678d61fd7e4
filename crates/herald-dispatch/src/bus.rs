//! In-process event bus child.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::event::StoredEvent;
use herald_core::store::StoreTransaction;

/// Republishes dispatched events to local subscribers.
///
/// Sending never fails a batch: with no subscribers the event is dropped,
/// and a lagging subscriber loses the oldest events, not the dispatcher.
/// Subscribers may see an event again if its batch is retried.
#[derive(Debug, Clone)]
pub struct EventBusDispatcher {
    sender: broadcast::Sender<StoredEvent>,
}

impl EventBusDispatcher {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to every event dispatched from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventDispatcher for EventBusDispatcher {
    fn name(&self) -> &'static str {
        "event-bus"
    }

    fn understands(&self, _event: &StoredEvent) -> bool {
        true
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        _transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => debug!(
                receivers,
                global_sequence = event.global_sequence,
                "published on bus"
            ),
            Err(_) => debug!(global_sequence = event.global_sequence, "no bus subscribers"),
        }
        Ok(())
    }
}
