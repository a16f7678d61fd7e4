//! In-memory implementation of the storage traits.
//!
//! Committed state sits behind a `RwLock`. A transaction takes the store's
//! write gate when it begins and holds it until commit, rollback or drop, so
//! transactions are serialized exactly like those under the `PostgreSQL`
//! advisory lock. Waiting for the gate is bounded by the store's lock
//! timeout; a begin that cannot get the gate in time fails with
//! `DomainError::UnitOfWork` instead of hanging behind a unit of work that
//! may never close. Writes are staged in the transaction and applied under a
//! single write lock at commit. Reads outside a transaction never wait on the
//! gate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use herald_core::cursor::{DispatchCursor, PublishedNotificationTracker};
use herald_core::error::DomainError;
use herald_core::event::{PendingEvent, StoredEvent};
use herald_core::notification::Notification;
use herald_core::store::{CursorStore, EventStore, NotificationStore, Purge, StoreTransaction};
use herald_core::stream::{EventStream, StreamId};

use crate::{DEFAULT_LOCK_TIMEOUT, writer_busy};

fn lock_err(context: &'static str) -> DomainError {
    DomainError::StoreUnavailable(format!("poisoned lock: {context}"))
}

fn closed_err() -> DomainError {
    DomainError::StoreUnavailable("transaction already closed".into())
}

fn read_state(state: &RwLock<State>) -> Result<RwLockReadGuard<'_, State>, DomainError> {
    state.read().map_err(|_| lock_err("read state"))
}

fn as_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn as_index(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}

#[derive(Debug, Default)]
struct State {
    /// Events in global-sequence order; index `i` holds sequence `i + 1`.
    events: Vec<StoredEvent>,
    /// Per-stream indexes into `events`, in version order.
    streams: HashMap<String, Vec<usize>>,
    cursors: HashMap<String, i64>,
    trackers: HashMap<String, PublishedNotificationTracker>,
    /// Per-exchange notifications; index `i` holds id `i + 1`.
    notifications: HashMap<String, Vec<Notification>>,
    notified: HashSet<(String, i64)>,
}

impl State {
    fn stream_version(&self, stream_name: &str) -> i64 {
        self.streams
            .get(stream_name)
            .map_or(0, |indexes| as_i64(indexes.len()))
    }

    fn notification_count(&self, exchange_name: &str) -> i64 {
        self.notifications
            .get(exchange_name)
            .map_or(0, |log| as_i64(log.len()))
    }

    fn apply(&mut self, staged: Staged) {
        for event in staged.events {
            let index = self.events.len();
            self.streams
                .entry(event.stream_name.clone())
                .or_default()
                .push(index);
            self.events.push(event);
        }
        for (dispatcher_id, last) in staged.cursors {
            let stored = self.cursors.entry(dispatcher_id).or_insert(0);
            *stored = (*stored).max(last);
        }
        self.trackers.extend(staged.trackers);
        for (exchange_name, global_sequence, notification) in staged.notifications {
            self.notified.insert((exchange_name.clone(), global_sequence));
            self.notifications
                .entry(exchange_name)
                .or_default()
                .push(notification);
        }
    }
}

#[derive(Debug, Default)]
struct Staged {
    events: Vec<StoredEvent>,
    cursors: HashMap<String, i64>,
    trackers: HashMap<String, PublishedNotificationTracker>,
    notifications: Vec<(String, i64, Notification)>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.cursors.is_empty()
            && self.trackers.is_empty()
            && self.notifications.is_empty()
    }
}

/// Thread-safe in-memory store, for tests and single-process demos.
///
/// Clones share the same data.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    write_gate: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            write_gate: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `begin` waits for an open transaction to close.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// A transaction against an [`InMemoryStore`].
pub struct InMemoryTransaction {
    state: Arc<RwLock<State>>,
    gate: Option<OwnedMutexGuard<()>>,
    staged: Staged,
    closed: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.closed {
            return Err(closed_err());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<Staged, DomainError> {
        if self.closed {
            return Err(closed_err());
        }
        self.closed = true;
        Ok(std::mem::take(&mut self.staged))
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn append(
        &mut self,
        stream_id: &StreamId,
        events: Vec<PendingEvent>,
    ) -> Result<EventStream, DomainError> {
        self.ensure_open()?;

        let stream_name = stream_id.stream_name();
        let (current, mut global_sequence) = {
            let state = read_state(&self.state)?;
            let staged_in_stream = self
                .staged
                .events
                .iter()
                .filter(|e| e.stream_name == stream_name)
                .count();
            (
                state.stream_version(stream_name) + as_i64(staged_in_stream),
                as_i64(state.events.len() + self.staged.events.len()),
            )
        };

        if current != stream_id.stream_version() {
            return Err(DomainError::ConcurrencyConflict {
                stream_name: stream_name.to_owned(),
                expected: stream_id.stream_version(),
                actual: current,
            });
        }

        let mut version = current;
        let mut appended = Vec::with_capacity(events.len());
        for pending in events {
            version += 1;
            global_sequence += 1;
            appended.push(pending.into_stored(stream_name, version, global_sequence));
        }
        self.staged.events.extend(appended.iter().cloned());

        Ok(EventStream {
            stream_name: stream_name.to_owned(),
            version,
            events: appended,
        })
    }

    async fn save_dispatch_cursor(&mut self, cursor: &DispatchCursor) -> Result<(), DomainError> {
        self.ensure_open()?;
        let staged = self
            .staged
            .cursors
            .entry(cursor.dispatcher_id.clone())
            .or_insert(0);
        *staged = (*staged).max(cursor.last_dispatched_global_sequence);
        Ok(())
    }

    async fn save_published_tracker(
        &mut self,
        tracker: &PublishedNotificationTracker,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        self.ensure_open()?;

        let existing = match self.staged.trackers.get(&tracker.type_name) {
            Some(staged) => Some(staged.clone()),
            None => read_state(&self.state)?
                .trackers
                .get(&tracker.type_name)
                .cloned(),
        };

        let saved = match existing {
            Some(existing) if existing.concurrency_version != tracker.concurrency_version => {
                return Err(DomainError::ConcurrencyConflict {
                    stream_name: tracker.type_name.clone(),
                    expected: i64::from(tracker.concurrency_version),
                    actual: i64::from(existing.concurrency_version),
                });
            }
            Some(existing) => PublishedNotificationTracker {
                type_name: tracker.type_name.clone(),
                most_recent_published_notification_id: existing
                    .most_recent_published_notification_id
                    .max(tracker.most_recent_published_notification_id),
                concurrency_version: existing.concurrency_version + 1,
            },
            None => PublishedNotificationTracker {
                concurrency_version: 1,
                ..tracker.clone()
            },
        };

        self.staged
            .trackers
            .insert(tracker.type_name.clone(), saved.clone());
        Ok(saved)
    }

    async fn append_notification(
        &mut self,
        exchange_name: &str,
        event: &StoredEvent,
    ) -> Result<Option<Notification>, DomainError> {
        self.ensure_open()?;

        let key = (exchange_name.to_owned(), event.global_sequence);
        let staged_for_exchange = self
            .staged
            .notifications
            .iter()
            .filter(|(exchange, _, _)| exchange == exchange_name);
        if staged_for_exchange
            .clone()
            .any(|(_, global_sequence, _)| *global_sequence == event.global_sequence)
        {
            return Ok(None);
        }
        let staged_count = as_i64(staged_for_exchange.count());

        let notification_id = {
            let state = read_state(&self.state)?;
            if state.notified.contains(&key) {
                return Ok(None);
            }
            state.notification_count(exchange_name) + staged_count + 1
        };

        let notification = Notification::from_stored_event(notification_id, event);
        self.staged
            .notifications
            .push((key.0, key.1, notification.clone()));
        Ok(Some(notification))
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let staged = self.close()?;
        if !staged.is_empty() {
            let appended = staged.events.len();
            let mut state = self.state.write().map_err(|_| lock_err("commit"))?;
            state.apply(staged);
            debug!(appended, "committed in-memory transaction");
        }
        self.gate = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.close()?;
        self.gate = None;
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let gate = tokio::time::timeout(
            self.lock_timeout,
            Arc::clone(&self.write_gate).lock_owned(),
        )
        .await
        .map_err(|_| writer_busy())?;
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            gate: Some(gate),
            staged: Staged::default(),
            closed: false,
        }))
    }

    async fn stream_for(
        &self,
        stream_name: &str,
        since_version: i64,
    ) -> Result<EventStream, DomainError> {
        let state = read_state(&self.state)?;
        let events = state
            .streams
            .get(stream_name)
            .map(|indexes| {
                indexes
                    .iter()
                    .skip(as_index(since_version))
                    .filter_map(|&i| state.events.get(i).cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(EventStream {
            stream_name: stream_name.to_owned(),
            version: state.stream_version(stream_name),
            events,
        })
    }

    async fn events_since(&self, global_sequence: i64) -> Result<Vec<StoredEvent>, DomainError> {
        let state = read_state(&self.state)?;
        Ok(state
            .events
            .iter()
            .skip(as_index(global_sequence))
            .cloned()
            .collect())
    }

    async fn max_global_sequence(&self) -> Result<i64, DomainError> {
        Ok(as_i64(read_state(&self.state)?.events.len()))
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn dispatch_cursor(&self, dispatcher_id: &str) -> Result<DispatchCursor, DomainError> {
        let state = read_state(&self.state)?;
        Ok(match state.cursors.get(dispatcher_id) {
            Some(&last) => DispatchCursor {
                dispatcher_id: dispatcher_id.to_owned(),
                last_dispatched_global_sequence: last,
            },
            None => DispatchCursor::initial(dispatcher_id),
        })
    }

    async fn published_notification_tracker(
        &self,
        type_name: &str,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        let state = read_state(&self.state)?;
        Ok(state
            .trackers
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| PublishedNotificationTracker::initial(type_name)))
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn count_notifications(&self, exchange_name: &str) -> Result<i64, DomainError> {
        Ok(read_state(&self.state)?.notification_count(exchange_name))
    }

    async fn notifications_between(
        &self,
        exchange_name: &str,
        low: i64,
        high: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        let state = read_state(&self.state)?;
        Ok(state
            .notifications
            .get(exchange_name)
            .map(|log| {
                log.iter()
                    .filter(|n| (low..=high).contains(&n.notification_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn notifications_since(
        &self,
        exchange_name: &str,
        notification_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        let state = read_state(&self.state)?;
        Ok(state
            .notifications
            .get(exchange_name)
            .map(|log| {
                log.iter()
                    .skip(as_index(notification_id))
                    .take(as_index(limit))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Purge for InMemoryStore {
    async fn purge(&self) -> Result<(), DomainError> {
        let mut state = self.state.write().map_err(|_| lock_err("purge"))?;
        *state = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use herald_core::unit_of_work::{UnitOfWork, UnitOfWorkState};
    use herald_test_support::{pending_event, pending_events, stored_event};

    use super::*;

    fn product_1(version: i64) -> StreamId {
        StreamId::new("Product:1", version)
    }

    #[tokio::test]
    async fn test_append_three_events_to_new_stream() {
        // Arrange
        let store = InMemoryStore::new();

        // Act
        let stream = store.append(&product_1(0), pending_events(3)).await.unwrap();
        let feed = store.events_since(0).await.unwrap();

        // Assert
        assert_eq!(stream.version, 3);
        assert_eq!(feed.len(), 3);
        let sequences: Vec<i64> = feed.iter().map(|e| e.global_sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        let versions: Vec<i64> = feed.iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_second_writer_at_same_version_conflicts_then_retries() {
        // Arrange
        let store = InMemoryStore::new();
        store.append(&product_1(0), pending_events(3)).await.unwrap();
        let first_read = store.stream_for("Product:1", 0).await.unwrap();
        let second_read = store.stream_for("Product:1", 0).await.unwrap();

        // Act
        store
            .append(&first_read.next_stream_id(), pending_events(1))
            .await
            .unwrap();
        let conflict = store
            .append(&second_read.next_stream_id(), pending_events(1))
            .await;

        // Assert
        match conflict {
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

        let reread = store.stream_for("Product:1", 0).await.unwrap();
        assert_eq!(reread.version, 4);
        let retried = store
            .append(&reread.next_stream_id(), pending_events(1))
            .await
            .unwrap();
        assert_eq!(retried.version, 5);
    }

    #[tokio::test]
    async fn test_rejected_append_writes_nothing() {
        let store = InMemoryStore::new();
        store.append(&product_1(0), pending_events(2)).await.unwrap();

        let result = store.append(&product_1(1), pending_events(3)).await;

        assert!(result.is_err());
        assert_eq!(store.max_global_sequence().await.unwrap(), 2);
        assert_eq!(store.stream_for("Product:1", 0).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_trace() {
        // Arrange
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.append(&product_1(0), pending_events(2)).await.unwrap();
        tx.save_dispatch_cursor(&DispatchCursor::initial("root").advanced_to(2))
            .await
            .unwrap();

        // Act
        tx.rollback().await.unwrap();

        // Assert
        assert!(store.events_since(0).await.unwrap().is_empty());
        assert_eq!(
            store
                .dispatch_cursor("root")
                .await
                .unwrap()
                .last_dispatched_global_sequence,
            0
        );
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_to_readers() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.append(&product_1(0), pending_events(1)).await.unwrap();

        assert_eq!(store.max_global_sequence().await.unwrap(), 0);

        tx.commit().await.unwrap();
        assert_eq!(store.max_global_sequence().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stream_for_returns_suffix_after_version() {
        let store = InMemoryStore::new();
        store.append(&product_1(0), pending_events(4)).await.unwrap();
        store
            .append(&StreamId::new("Product:2", 0), pending_events(1))
            .await
            .unwrap();

        let stream = store.stream_for("Product:1", 2).await.unwrap();

        assert_eq!(stream.version, 4);
        let versions: Vec<i64> = stream.events.iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![3, 4]);
        assert!(store.stream_for("Product:9", 0).await.unwrap().is_new());
    }

    #[tokio::test]
    async fn test_events_since_is_stable_without_appends() {
        let store = InMemoryStore::new();
        store.append(&product_1(0), pending_events(3)).await.unwrap();
        store
            .append(&StreamId::new("Product:2", 0), pending_events(2))
            .await
            .unwrap();

        let first = store.events_since(2).await.unwrap();
        let second = store.events_since(2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].global_sequence, 3);
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_different_streams_all_succeed() {
        // Arrange
        let store = InMemoryStore::new();

        // Act
        let mut handles = Vec::new();
        for i in 0..8 {
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

        // Assert
        let feed = store.events_since(0).await.unwrap();
        let sequences: Vec<i64> = feed.iter().map(|e| e.global_sequence).collect();
        assert_eq!(sequences, (1..=16).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_second_writer_waits_for_first_to_close() {
        let store = InMemoryStore::new();
        let mut first = store.begin().await.unwrap();
        first.append(&product_1(0), pending_events(1)).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.append(&product_1(0), pending_events(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        first.commit().await.unwrap();
        let result = contender.await.unwrap();

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_begin_while_another_unit_of_work_is_active_fails_instead_of_hanging() {
        // Arrange
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(50));
        let mut outer = UnitOfWork::begun(&store).await.unwrap();
        outer
            .transaction()
            .unwrap()
            .append(&product_1(0), pending_events(1))
            .await
            .unwrap();

        // Act
        let inner = tokio::time::timeout(Duration::from_secs(2), UnitOfWork::begun(&store)).await;

        // Assert
        assert!(matches!(
            inner,
            Ok(Err(DomainError::UnitOfWork {
                operation: "begin",
                state: UnitOfWorkState::Active
            }))
        ));
        outer.success().await.unwrap();
        assert_eq!(store.max_global_sequence().await.unwrap(), 1);
        let mut next = UnitOfWork::begun(&store).await.unwrap();
        next.success().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_transaction_releases_write_gate() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.append(&product_1(0), pending_events(1)).await.unwrap();
        }

        let stream = store.append(&product_1(0), pending_events(1)).await.unwrap();

        assert_eq!(stream.version, 1);
    }

    #[tokio::test]
    async fn test_dispatch_cursor_never_moves_backwards() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_dispatch_cursor(&DispatchCursor::initial("root").advanced_to(5))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.save_dispatch_cursor(&DispatchCursor::initial("root").advanced_to(3))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let cursor = store.dispatch_cursor("root").await.unwrap();
        assert_eq!(cursor.last_dispatched_global_sequence, 5);
    }

    #[tokio::test]
    async fn test_stale_tracker_save_conflicts() {
        // Arrange
        let store = InMemoryStore::new();
        let read = store
            .published_notification_tracker("herald.agilepm")
            .await
            .unwrap();
        let mut tx = store.begin().await.unwrap();
        let saved = tx.save_published_tracker(&read.advanced_to(3)).await.unwrap();
        tx.commit().await.unwrap();

        // Act
        let mut tx = store.begin().await.unwrap();
        let stale = tx.save_published_tracker(&read.advanced_to(4)).await;
        tx.rollback().await.unwrap();

        // Assert
        assert_eq!(saved.concurrency_version, 1);
        assert!(matches!(stale, Err(DomainError::ConcurrencyConflict { .. })));
        let current = store
            .published_notification_tracker("herald.agilepm")
            .await
            .unwrap();
        assert_eq!(current.most_recent_published_notification_id, 3);
    }

    #[tokio::test]
    async fn test_notifications_are_dense_and_recorded_once_per_event() {
        // Arrange
        let store = InMemoryStore::new();
        let first = stored_event(1, "Product:1", 1);
        let second = stored_event(2, "Product:1", 2);

        // Act
        let mut tx = store.begin().await.unwrap();
        let a = tx.append_notification("ex", &first).await.unwrap();
        let again = tx.append_notification("ex", &first).await.unwrap();
        let b = tx.append_notification("ex", &second).await.unwrap();
        let other = tx.append_notification("other", &second).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let redelivered = tx.append_notification("ex", &second).await.unwrap();
        tx.commit().await.unwrap();

        // Assert
        assert_eq!(a.map(|n| n.notification_id), Some(1));
        assert!(again.is_none());
        assert_eq!(b.map(|n| n.notification_id), Some(2));
        assert_eq!(other.map(|n| n.notification_id), Some(1));
        assert!(redelivered.is_none());
        assert_eq!(store.count_notifications("ex").await.unwrap(), 2);
        let since = store.notifications_since("ex", 1, 10).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].notification_id, 2);
        let between = store.notifications_between("ex", 1, 2).await.unwrap();
        assert_eq!(between.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_clears_everything() {
        let store = InMemoryStore::new();
        store
            .append(&product_1(0), vec![pending_event("agilepm.product_renamed")])
            .await
            .unwrap();

        store.purge().await.unwrap();

        assert_eq!(store.max_global_sequence().await.unwrap(), 0);
        assert!(store.stream_for("Product:1", 0).await.unwrap().is_new());
    }
}
