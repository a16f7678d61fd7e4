//! Builders for pending and stored events.

use chrono::{DateTime, Duration, TimeZone, Utc};
use herald_core::event::{PendingEvent, StoredEvent};
use uuid::Uuid;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A pending event of `event_type` at schema version 1 with a small payload.
#[must_use]
pub fn pending_event(event_type: &str) -> PendingEvent {
    PendingEvent {
        event_id: Uuid::now_v7(),
        event_type: event_type.to_owned(),
        metadata_version: 1,
        occurred_on: base_time(),
        payload: serde_json::json!({ "productId": "p-1", "name": "Herald" }),
        correlation_id: Uuid::new_v4(),
    }
}

/// `count` pending `test.happened` events, one second apart, numbered in
/// their payloads.
#[must_use]
pub fn pending_events(count: usize) -> Vec<PendingEvent> {
    (0..count)
        .map(|n| {
            let mut event = pending_event("test.happened");
            let offset = i64::try_from(n).unwrap_or(i64::MAX);
            event.occurred_on = base_time() + Duration::seconds(offset);
            event.payload = serde_json::json!({ "n": n });
            event
        })
        .collect()
}

/// A stored event as the store would return it.
#[must_use]
pub fn stored_event(global_sequence: i64, stream_name: &str, stream_version: i64) -> StoredEvent {
    pending_event("test.happened").into_stored(stream_name, stream_version, global_sequence)
}
