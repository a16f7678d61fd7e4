//! Root dispatcher that owns a durable cursor over the event feed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::event::StoredEvent;
use herald_core::store::{CursorStore, EventStore, Storage, StoreTransaction};
use herald_core::unit_of_work::UnitOfWork;

use crate::scheduler::PeriodicTask;

/// Reads undispatched events past its cursor and forwards them to its
/// children.
///
/// Delivery is at least once: a batch is retried in full until every
/// understanding child accepts every event, and only then does the cursor
/// move, in the same transaction as whatever the children wrote. A failing
/// child holds back every other child on this root.
pub struct EventStoreDispatcher {
    dispatcher_id: String,
    storage: Arc<dyn Storage>,
    children: Vec<Arc<dyn EventDispatcher>>,
}

impl EventStoreDispatcher {
    /// Creates a root with no children.
    #[must_use]
    pub fn new(dispatcher_id: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            dispatcher_id: dispatcher_id.into(),
            storage,
            children: Vec::new(),
        }
    }

    /// The id under which this root's cursor is stored.
    #[must_use]
    pub fn dispatcher_id(&self) -> &str {
        &self.dispatcher_id
    }

    /// Dispatches every event past the cursor, then advances the cursor to
    /// the last of them. Returns the number of events dispatched.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DispatchFailure` if a child fails; the batch is
    /// rolled back and the cursor stays put. Store errors propagate as-is.
    #[instrument(skip(self), fields(dispatcher = %self.dispatcher_id))]
    pub async fn dispatch_pending_events(&self) -> Result<usize, DomainError> {
        let cursor = self.storage.dispatch_cursor(&self.dispatcher_id).await?;
        let events = self
            .storage
            .events_since(cursor.last_dispatched_global_sequence)
            .await?;
        let Some(last) = events.last() else {
            return Ok(0);
        };

        let mut unit_of_work = UnitOfWork::begun(self.storage.as_ref()).await?;
        for event in &events {
            if let Err(err) = self
                .forward(event, unit_of_work.transaction()?)
                .await
            {
                return Err(unit_of_work.fail(err).await);
            }
        }

        let advanced = cursor.advanced_to(last.global_sequence);
        if let Err(err) = unit_of_work
            .transaction()?
            .save_dispatch_cursor(&advanced)
            .await
        {
            return Err(unit_of_work.fail(err).await);
        }
        unit_of_work.success().await?;

        info!(
            dispatched = events.len(),
            cursor = advanced.last_dispatched_global_sequence,
            "dispatched events"
        );
        Ok(events.len())
    }

    async fn forward(
        &self,
        event: &StoredEvent,
        transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        for child in &self.children {
            if !child.understands(event) {
                continue;
            }
            debug!(
                child = child.name(),
                global_sequence = event.global_sequence,
                event_type = %event.event_type,
                "dispatching"
            );
            child
                .dispatch(event, transaction)
                .await
                .map_err(|err| DomainError::DispatchFailure {
                    dispatcher: child.name().to_owned(),
                    global_sequence: event.global_sequence,
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventDispatcher for EventStoreDispatcher {
    fn name(&self) -> &str {
        &self.dispatcher_id
    }

    fn understands(&self, event: &StoredEvent) -> bool {
        self.children.iter().any(|child| child.understands(event))
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        self.forward(event, transaction).await
    }

    fn register_event_dispatcher(
        &mut self,
        child: Arc<dyn EventDispatcher>,
    ) -> Result<(), DomainError> {
        info!(
            dispatcher = %self.dispatcher_id,
            child = child.name(),
            "registered event dispatcher"
        );
        self.children.push(child);
        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for EventStoreDispatcher {
    fn name(&self) -> &str {
        &self.dispatcher_id
    }

    async fn run_once(&self) -> Result<usize, DomainError> {
        self.dispatch_pending_events().await
    }
}
