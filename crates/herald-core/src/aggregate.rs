//! Aggregate root abstraction.

use crate::event::DomainEvent;
use crate::stream::StreamId;

/// Trait for aggregate roots that reconstitute from their event stream.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The aggregate's stream, expecting the version it was loaded at.
    fn stream_id(&self) -> StreamId;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state (used during reconstitution).
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);
}
