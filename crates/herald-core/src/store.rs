//! Storage ports.
//!
//! The primary store holds events, cursors and notifications. Every write
//! goes through a `StoreTransaction` obtained from `EventStore::begin`, so
//! an event append, a cursor advance and the notifications they produce
//! commit together or not at all. Reads go straight to committed state.

use async_trait::async_trait;

use crate::cursor::{DispatchCursor, PublishedNotificationTracker};
use crate::error::DomainError;
use crate::event::{PendingEvent, StoredEvent};
use crate::notification::Notification;
use crate::stream::{EventStream, StreamId};

/// An open transaction against the primary store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Appends `events` to the stream at the next contiguous versions,
    /// assigning each a new global sequence.
    ///
    /// Returns the appended suffix of the stream together with its new
    /// version. An empty batch appends nothing but still checks the
    /// expected version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream's current
    /// version differs from `stream_id.stream_version()`, or
    /// `DomainError::StoreUnavailable` on I/O failure.
    async fn append(
        &mut self,
        stream_id: &StreamId,
        events: Vec<PendingEvent>,
    ) -> Result<EventStream, DomainError>;

    /// Persists a dispatch cursor. A lower value than the stored one leaves
    /// the stored value in place.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn save_dispatch_cursor(&mut self, cursor: &DispatchCursor) -> Result<(), DomainError>;

    /// Persists a publisher tracker, checking its `concurrency_version`.
    ///
    /// Returns the tracker as stored, with its concurrency version bumped.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the tracker was saved by
    /// someone else since it was read.
    async fn save_published_tracker(
        &mut self,
        tracker: &PublishedNotificationTracker,
    ) -> Result<PublishedNotificationTracker, DomainError>;

    /// Records `event` as the next notification of `exchange_name`.
    ///
    /// Returns `None` if the event was already recorded for this exchange.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn append_notification(
        &mut self,
        exchange_name: &str,
        event: &StoredEvent,
    ) -> Result<Option<Notification>, DomainError>;

    /// Commits every write made through this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is already closed or the commit
    /// fails; in the latter case nothing was written.
    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards every write made through this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is already closed.
    async fn rollback(&mut self) -> Result<(), DomainError>;
}

/// Append-only event storage and the dispatchable event feed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Opens a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` if the store cannot be reached.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;

    /// Appends in a transaction of its own.
    ///
    /// # Errors
    ///
    /// As `StoreTransaction::append`.
    async fn append(
        &self,
        stream_id: &StreamId,
        events: Vec<PendingEvent>,
    ) -> Result<EventStream, DomainError> {
        let mut transaction = self.begin().await?;
        match transaction.append(stream_id, events).await {
            Ok(stream) => {
                transaction.commit().await?;
                Ok(stream)
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed append failed");
                }
                Err(err)
            }
        }
    }

    /// Events of `stream_name` with version greater than `since_version`,
    /// ascending. The returned stream's `version` is the stream's current
    /// version; an unknown stream is empty at version 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn stream_for(
        &self,
        stream_name: &str,
        since_version: i64,
    ) -> Result<EventStream, DomainError>;

    /// Every event with a global sequence greater than `global_sequence`, in
    /// ascending order, across all streams.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn events_since(&self, global_sequence: i64) -> Result<Vec<StoredEvent>, DomainError>;

    /// The highest committed global sequence, or 0 for an empty store.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn max_global_sequence(&self) -> Result<i64, DomainError>;
}

/// Read access to durable progress markers. Writes go through
/// `StoreTransaction`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// The cursor for `dispatcher_id`, or an initial cursor at 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn dispatch_cursor(&self, dispatcher_id: &str) -> Result<DispatchCursor, DomainError>;

    /// The tracker for `type_name`, or an initial tracker at 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn published_notification_tracker(
        &self,
        type_name: &str,
    ) -> Result<PublishedNotificationTracker, DomainError>;
}

/// Read access to recorded notifications, per exchange.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Number of notifications recorded for `exchange_name`, which is also
    /// the highest notification id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn count_notifications(&self, exchange_name: &str) -> Result<i64, DomainError>;

    /// Notifications with `low <= id <= high`, ascending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn notifications_between(
        &self,
        exchange_name: &str,
        low: i64,
        high: i64,
    ) -> Result<Vec<Notification>, DomainError>;

    /// At most `limit` notifications with id greater than `notification_id`,
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn notifications_since(
        &self,
        exchange_name: &str,
        notification_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, DomainError>;
}

/// Clears all stored data. Only test collaborators are given this.
#[async_trait]
pub trait Purge: Send + Sync {
    /// Removes every event, cursor, tracker and notification.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on I/O failure.
    async fn purge(&self) -> Result<(), DomainError>;
}

/// Everything the pipeline needs from one primary store.
pub trait Storage: EventStore + CursorStore + NotificationStore {}

impl<T: EventStore + CursorStore + NotificationStore + ?Sized> Storage for T {}
