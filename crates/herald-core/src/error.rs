//! Domain error types.

use thiserror::Error;

use crate::unit_of_work::UnitOfWorkState;

/// Top-level error type for the event store, dispatcher chain and publisher.
///
/// Every variant except a fatal startup failure is recoverable at the
/// request or tick boundary by retrying.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate stream or resource was not found.
    #[error("not found: {0}")]
    AggregateNotFound(String),

    /// Optimistic concurrency conflict on a stream or tracker.
    #[error(
        "concurrency conflict on stream {stream_name}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The stream (or tracker) that had the conflict.
        stream_name: String,
        /// The version the caller expected.
        expected: i64,
        /// The version actually stored.
        actual: i64,
    },

    /// A validation error in domain logic or in a request.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O failure talking to the primary store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A child dispatcher failed while handling a batch.
    #[error("dispatcher {dispatcher} failed on event {global_sequence}: {reason}")]
    DispatchFailure {
        /// Name of the failing dispatcher.
        dispatcher: String,
        /// Global sequence of the event being dispatched.
        global_sequence: i64,
        /// Underlying failure.
        reason: String,
    },

    /// Sending a notification to the broker failed.
    #[error("publishing notification {notification_id} failed: {reason}")]
    PublishFailure {
        /// The notification that could not be sent.
        notification_id: i64,
        /// Underlying failure.
        reason: String,
    },

    /// A stored event's schema version is not readable by this process.
    #[error("event {event_type} has schema version {found}, reader supports {supported}")]
    VersionMismatch {
        /// The event type name.
        event_type: String,
        /// The version recorded with the event.
        found: i32,
        /// The current version known to the reader.
        supported: i32,
    },

    /// The event type is not registered in the event catalog.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A unit of work operation was attempted in an illegal state.
    #[error("cannot {operation} unit of work in state {state:?}")]
    UnitOfWork {
        /// The attempted operation.
        operation: &'static str,
        /// The state the unit of work was in.
        state: UnitOfWorkState,
    },

    /// Payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl DomainError {
    /// Returns `true` when the caller should re-read and retry the whole
    /// business operation.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
