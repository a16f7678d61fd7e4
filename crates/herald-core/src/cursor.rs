//! Durable progress markers.
//!
//! A `DispatchCursor` remembers how far a root dispatcher has read the event
//! feed; a `PublishedNotificationTracker` remembers how far a publisher has
//! sent an exchange's notifications. Both are single-writer rows created
//! lazily at 0 and advanced only after their side effects are confirmed.

use serde::{Deserialize, Serialize};

/// Per-dispatcher position in the global event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCursor {
    /// The owning dispatcher.
    pub dispatcher_id: String,
    /// Global sequence of the last event dispatched to every child.
    pub last_dispatched_global_sequence: i64,
}

impl DispatchCursor {
    /// A cursor that has not dispatched anything yet.
    #[must_use]
    pub fn initial(dispatcher_id: impl Into<String>) -> Self {
        Self {
            dispatcher_id: dispatcher_id.into(),
            last_dispatched_global_sequence: 0,
        }
    }

    /// Returns the cursor moved to `global_sequence`. Never moves backwards.
    #[must_use]
    pub fn advanced_to(&self, global_sequence: i64) -> Self {
        Self {
            dispatcher_id: self.dispatcher_id.clone(),
            last_dispatched_global_sequence: self
                .last_dispatched_global_sequence
                .max(global_sequence),
        }
    }
}

/// Per-exchange publishing progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedNotificationTracker {
    /// The exchange (publishing target) this tracker belongs to.
    pub type_name: String,
    /// Id of the last notification confirmed sent.
    pub most_recent_published_notification_id: i64,
    /// Optimistic lock on the tracker row.
    pub concurrency_version: i32,
}

impl PublishedNotificationTracker {
    /// A tracker that has not published anything yet.
    #[must_use]
    pub fn initial(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            most_recent_published_notification_id: 0,
            concurrency_version: 0,
        }
    }

    /// Returns the tracker moved to `notification_id`. Never moves backwards.
    #[must_use]
    pub fn advanced_to(&self, notification_id: i64) -> Self {
        Self {
            type_name: self.type_name.clone(),
            most_recent_published_notification_id: self
                .most_recent_published_notification_id
                .max(notification_id),
            concurrency_version: self.concurrency_version,
        }
    }
}
