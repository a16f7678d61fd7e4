//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name (the tag used for deserialization routing).
    fn event_type(&self) -> &'static str;

    /// Schema version of this event type.
    fn event_version(&self) -> i32;

    /// When the event happened.
    fn occurred_on(&self) -> DateTime<Utc>;

    /// Serializes the event body to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the body cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;
}

/// An event ready to be appended. The store assigns its stream version and
/// global sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// Unique event identifier, kept for downstream deduplication.
    pub event_id: Uuid,
    /// Event type name.
    pub event_type: String,
    /// Schema version of the event type.
    pub metadata_version: i32,
    /// When the event happened.
    pub occurred_on: DateTime<Utc>,
    /// Serialized event body.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
}

impl PendingEvent {
    /// Captures a domain event for appending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event body cannot be encoded.
    pub fn from_domain_event(
        event: &dyn DomainEvent,
        correlation_id: Uuid,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_owned(),
            metadata_version: event.event_version(),
            occurred_on: event.occurred_on(),
            payload: event.to_payload()?,
            correlation_id,
        })
    }

    /// Stamps this event with its assigned stream position and global sequence.
    #[must_use]
    pub fn into_stored(
        self,
        stream_name: &str,
        stream_version: i64,
        global_sequence: i64,
    ) -> StoredEvent {
        StoredEvent {
            global_sequence,
            event_id: self.event_id,
            stream_name: stream_name.to_owned(),
            stream_version,
            event_type: self.event_type,
            metadata_version: self.metadata_version,
            occurred_on: self.occurred_on,
            payload: self.payload,
            correlation_id: self.correlation_id,
        }
    }
}

/// Stored representation of a domain event.
///
/// Created once on append and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Store-wide position, strictly increasing from 1.
    pub global_sequence: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The stream this event belongs to.
    pub stream_name: String,
    /// The version the stream reached after this event.
    pub stream_version: i64,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Schema version of the event type when it was written.
    pub metadata_version: i32,
    /// When the event happened.
    pub occurred_on: DateTime<Utc>,
    /// Serialized event body.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
}
