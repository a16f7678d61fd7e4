//! Integration tests for `PgStore`.
//!
//! These need a running PostgreSQL reachable through `DATABASE_URL`; run
//! them with `cargo test -- --ignored`.

use std::time::Duration;

use herald_core::cursor::DispatchCursor;
use herald_core::error::DomainError;
use herald_core::store::{CursorStore, EventStore, NotificationStore, Purge};
use herald_core::stream::StreamId;
use herald_core::unit_of_work::{UnitOfWork, UnitOfWorkState};
use herald_event_store::pg::PgStore;
use herald_test_support::{pending_event, pending_events};
use sqlx::PgPool;

// --- append + stream_for ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_stream_for_unknown_stream_is_empty(pool: PgPool) {
    let store = PgStore::new(pool);

    let stream = store.stream_for("Product:missing", 0).await.unwrap();

    assert!(stream.is_new());
    assert!(stream.events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_append_three_events_assigns_versions_and_sequences(pool: PgPool) {
    // Arrange
    let store = PgStore::new(pool);

    // Act
    let stream = store
        .append(&StreamId::new("Product:1", 0), pending_events(3))
        .await
        .unwrap();
    let feed = store.events_since(0).await.unwrap();

    // Assert
    assert_eq!(stream.version, 3);
    let sequences: Vec<i64> = feed.iter().map(|e| e.global_sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    let versions: Vec<i64> = feed.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_stored_event_round_trips_every_field(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut pending = pending_event("agilepm.product_created");
    pending.payload = serde_json::json!({
        "nested": {"key": "value", "number": 42},
        "array": [1, "two", null, true],
    });
    let expected = pending.clone();

    store
        .append(&StreamId::new("Product:1", 0), vec![pending])
        .await
        .unwrap();

    let loaded = store.stream_for("Product:1", 0).await.unwrap();
    let event = &loaded.events[0];
    assert_eq!(event.event_id, expected.event_id);
    assert_eq!(event.event_type, expected.event_type);
    assert_eq!(event.metadata_version, expected.metadata_version);
    assert_eq!(event.payload, expected.payload);
    assert_eq!(event.correlation_id, expected.correlation_id);
    // TIMESTAMPTZ keeps microseconds.
    assert_eq!(
        event.occurred_on.timestamp_micros(),
        expected.occurred_on.timestamp_micros()
    );
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_stale_expected_version_conflicts_and_writes_nothing(pool: PgPool) {
    // Arrange
    let store = PgStore::new(pool);
    store
        .append(&StreamId::new("Product:1", 0), pending_events(3))
        .await
        .unwrap();
    store
        .append(&StreamId::new("Product:1", 3), pending_events(1))
        .await
        .unwrap();

    // Act
    let result = store
        .append(&StreamId::new("Product:1", 3), pending_events(2))
        .await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            stream_name,
            expected,
            actual,
        }) => {
            assert_eq!(stream_name, "Product:1");
            assert_eq!(expected, 3);
            assert_eq!(actual, 4);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(store.max_global_sequence().await.unwrap(), 4);

    let retried = store
        .append(&StreamId::new("Product:1", 4), pending_events(1))
        .await
        .unwrap();
    assert_eq!(retried.version, 5);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_appends_to_different_streams_leave_no_gaps(pool: PgPool) {
    let store = PgStore::new(pool);

    let mut handles = Vec::new();
    for i in 0..6 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(&StreamId::new(format!("Product:{i}"), 0), pending_events(2))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let feed = store.events_since(0).await.unwrap();
    let sequences: Vec<i64> = feed.iter().map(|e| e.global_sequence).collect();
    assert_eq!(sequences, (1..=12).collect::<Vec<i64>>());
}

// --- transactions ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_events_and_cursor_commit_together(pool: PgPool) {
    // Arrange
    let store = PgStore::new(pool);
    let mut tx = store.begin().await.unwrap();
    tx.append(&StreamId::new("Product:1", 0), pending_events(2))
        .await
        .unwrap();
    tx.save_dispatch_cursor(&DispatchCursor::initial("root").advanced_to(2))
        .await
        .unwrap();

    // Act
    tx.rollback().await.unwrap();

    // Assert
    assert!(store.events_since(0).await.unwrap().is_empty());
    let cursor = store.dispatch_cursor("root").await.unwrap();
    assert_eq!(cursor.last_dispatched_global_sequence, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_dispatch_cursor_keeps_highest_value(pool: PgPool) {
    let store = PgStore::new(pool);
    for value in [5, 3] {
        let mut tx = store.begin().await.unwrap();
        tx.save_dispatch_cursor(&DispatchCursor::initial("root").advanced_to(value))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let cursor = store.dispatch_cursor("root").await.unwrap();

    assert_eq!(cursor.last_dispatched_global_sequence, 5);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_tracker_save_checks_concurrency_version(pool: PgPool) {
    let store = PgStore::new(pool);
    let read = store
        .published_notification_tracker("herald.agilepm")
        .await
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    let saved = tx.save_published_tracker(&read.advanced_to(10)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let stale = tx.save_published_tracker(&read.advanced_to(11)).await;
    tx.rollback().await.unwrap();

    assert_eq!(saved.concurrency_version, 1);
    assert!(matches!(
        stale,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_begin_while_another_unit_of_work_is_active_times_out(pool: PgPool) {
    // Arrange
    let store = PgStore::new(pool).with_lock_timeout(Duration::from_millis(100));
    let mut outer = UnitOfWork::begun(&store).await.unwrap();
    outer
        .transaction()
        .unwrap()
        .append(&StreamId::new("Product:1", 0), pending_events(1))
        .await
        .unwrap();

    // Act
    let inner = UnitOfWork::begun(&store).await;

    // Assert
    assert!(matches!(
        inner,
        Err(DomainError::UnitOfWork {
            operation: "begin",
            state: UnitOfWorkState::Active
        })
    ));
    outer.success().await.unwrap();
    assert_eq!(store.max_global_sequence().await.unwrap(), 1);
}

// --- notifications ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_notifications_are_numbered_per_exchange_once_per_event(pool: PgPool) {
    // Arrange
    let store = PgStore::new(pool);
    let stream = store
        .append(&StreamId::new("Product:1", 0), pending_events(3))
        .await
        .unwrap();

    // Act
    let mut tx = store.begin().await.unwrap();
    for event in &stream.events {
        tx.append_notification("herald.agilepm", event).await.unwrap();
    }
    let duplicate = tx
        .append_notification("herald.agilepm", &stream.events[0])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // Assert
    assert!(duplicate.is_none());
    assert_eq!(store.count_notifications("herald.agilepm").await.unwrap(), 3);
    let page = store
        .notifications_between("herald.agilepm", 1, 2)
        .await
        .unwrap();
    let ids: Vec<i64> = page.iter().map(|n| n.notification_id).collect();
    assert_eq!(ids, vec![1, 2]);
    let since = store
        .notifications_since("herald.agilepm", 1, 1)
        .await
        .unwrap();
    assert_eq!(since.len(), 1);
    assert_eq!(since[0].notification_id, 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_purge_clears_every_table(pool: PgPool) {
    let store = PgStore::new(pool);
    store
        .append(&StreamId::new("Product:1", 0), pending_events(2))
        .await
        .unwrap();

    store.purge().await.unwrap();

    assert_eq!(store.max_global_sequence().await.unwrap(), 0);
}
