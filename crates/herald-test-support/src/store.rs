//! Test stores: storage doubles that fail on purpose.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use herald_core::cursor::{DispatchCursor, PublishedNotificationTracker};
use herald_core::error::DomainError;
use herald_core::event::{PendingEvent, StoredEvent};
use herald_core::notification::Notification;
use herald_core::store::{CursorStore, EventStore, NotificationStore, Storage, StoreTransaction};
use herald_core::stream::{EventStream, StreamId};

fn unavailable() -> DomainError {
    DomainError::StoreUnavailable("connection refused".into())
}

/// A store that always returns `StoreUnavailable`. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct UnavailableStore;

#[async_trait]
impl EventStore for UnavailableStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        Err(unavailable())
    }

    async fn stream_for(&self, _: &str, _: i64) -> Result<EventStream, DomainError> {
        Err(unavailable())
    }

    async fn events_since(&self, _: i64) -> Result<Vec<StoredEvent>, DomainError> {
        Err(unavailable())
    }

    async fn max_global_sequence(&self) -> Result<i64, DomainError> {
        Err(unavailable())
    }
}

#[async_trait]
impl CursorStore for UnavailableStore {
    async fn dispatch_cursor(&self, _: &str) -> Result<DispatchCursor, DomainError> {
        Err(unavailable())
    }

    async fn published_notification_tracker(
        &self,
        _: &str,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        Err(unavailable())
    }
}

#[async_trait]
impl NotificationStore for UnavailableStore {
    async fn count_notifications(&self, _: &str) -> Result<i64, DomainError> {
        Err(unavailable())
    }

    async fn notifications_between(
        &self,
        _: &str,
        _: i64,
        _: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        Err(unavailable())
    }

    async fn notifications_since(
        &self,
        _: &str,
        _: i64,
        _: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        Err(unavailable())
    }
}

/// Wraps a real store and refuses every commit until healed, as if the
/// process died between the last write of a transaction and its commit.
///
/// Writes reach the wrapped transaction as usual; a refused commit rolls
/// it back. Reads pass straight through.
pub struct FailingCommitStore {
    inner: Arc<dyn Storage>,
    failing: Arc<AtomicBool>,
}

impl FailingCommitStore {
    /// Wraps `inner`, failing commits from the start.
    #[must_use]
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Lets commits through again.
    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

struct FailingCommitTransaction {
    inner: Box<dyn StoreTransaction>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTransaction for FailingCommitTransaction {
    async fn append(
        &mut self,
        stream_id: &StreamId,
        events: Vec<PendingEvent>,
    ) -> Result<EventStream, DomainError> {
        self.inner.append(stream_id, events).await
    }

    async fn save_dispatch_cursor(&mut self, cursor: &DispatchCursor) -> Result<(), DomainError> {
        self.inner.save_dispatch_cursor(cursor).await
    }

    async fn save_published_tracker(
        &mut self,
        tracker: &PublishedNotificationTracker,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        self.inner.save_published_tracker(tracker).await
    }

    async fn append_notification(
        &mut self,
        exchange_name: &str,
        event: &StoredEvent,
    ) -> Result<Option<Notification>, DomainError> {
        self.inner.append_notification(exchange_name, event).await
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            self.inner.rollback().await?;
            return Err(DomainError::StoreUnavailable("connection lost before commit".into()));
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl EventStore for FailingCommitStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        Ok(Box::new(FailingCommitTransaction {
            inner: self.inner.begin().await?,
            failing: Arc::clone(&self.failing),
        }))
    }

    async fn stream_for(
        &self,
        stream_name: &str,
        since_version: i64,
    ) -> Result<EventStream, DomainError> {
        self.inner.stream_for(stream_name, since_version).await
    }

    async fn events_since(&self, global_sequence: i64) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.events_since(global_sequence).await
    }

    async fn max_global_sequence(&self) -> Result<i64, DomainError> {
        self.inner.max_global_sequence().await
    }
}

#[async_trait]
impl CursorStore for FailingCommitStore {
    async fn dispatch_cursor(&self, dispatcher_id: &str) -> Result<DispatchCursor, DomainError> {
        self.inner.dispatch_cursor(dispatcher_id).await
    }

    async fn published_notification_tracker(
        &self,
        type_name: &str,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        self.inner.published_notification_tracker(type_name).await
    }
}

#[async_trait]
impl NotificationStore for FailingCommitStore {
    async fn count_notifications(&self, exchange_name: &str) -> Result<i64, DomainError> {
        self.inner.count_notifications(exchange_name).await
    }

    async fn notifications_between(
        &self,
        exchange_name: &str,
        low: i64,
        high: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        self.inner.notifications_between(exchange_name, low, high).await
    }

    async fn notifications_since(
        &self,
        exchange_name: &str,
        notification_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        self.inner.notifications_since(exchange_name, notification_id, limit).await
    }
}
