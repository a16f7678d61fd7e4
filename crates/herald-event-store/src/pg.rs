//! `PostgreSQL` implementation of the storage traits.
//!
//! Every transaction takes a transaction-scoped advisory lock when it
//! begins and holds it until commit. Global sequences are allocated as
//! `MAX + 1` under that lock, so appends commit in sequence order and a feed
//! reader never observes a later event before an earlier one becomes
//! visible. The wait for the lock is bounded by `lock_timeout`; a begin that
//! times out fails with `DomainError::UnitOfWork`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use herald_core::cursor::{DispatchCursor, PublishedNotificationTracker};
use herald_core::error::DomainError;
use herald_core::event::{PendingEvent, StoredEvent};
use herald_core::notification::Notification;
use herald_core::store::{CursorStore, EventStore, NotificationStore, Purge, StoreTransaction};
use herald_core::stream::{EventStream, StreamId};

use crate::schema::GLOBAL_SEQUENCE_LOCK;
use crate::{DEFAULT_LOCK_TIMEOUT, writer_busy};

fn store_err(err: sqlx::Error) -> DomainError {
    DomainError::StoreUnavailable(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// `lock_not_available`, raised when `lock_timeout` expires.
fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("55P03"))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    global_sequence: i64,
    event_id: Uuid,
    stream_name: String,
    stream_version: i64,
    event_type: String,
    metadata_version: i32,
    occurred_on: DateTime<Utc>,
    payload: serde_json::Value,
    correlation_id: Uuid,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            global_sequence: row.global_sequence,
            event_id: row.event_id,
            stream_name: row.stream_name,
            stream_version: row.stream_version,
            event_type: row.event_type,
            metadata_version: row.metadata_version,
            occurred_on: row.occurred_on,
            payload: row.payload,
            correlation_id: row.correlation_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    notification_id: i64,
    type_name: String,
    occurred_on: DateTime<Utc>,
    version: i32,
    event: serde_json::Value,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            notification_id: row.notification_id,
            type_name: row.type_name,
            occurred_on: row.occurred_on,
            version: row.version,
            event: row.event,
        }
    }
}

/// PostgreSQL-backed store for events, cursors and notifications.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Creates a new `PgStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long `begin` waits for the writer lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// An open `PostgreSQL` transaction.
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, DomainError> {
        self.tx
            .as_mut()
            .ok_or_else(|| DomainError::StoreUnavailable("transaction already closed".into()))
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn append(
        &mut self,
        stream_id: &StreamId,
        events: Vec<PendingEvent>,
    ) -> Result<EventStream, DomainError> {
        let tx = self.open()?;

        let (current,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(stream_version), 0) FROM stored_events WHERE stream_name = $1",
        )
        .bind(stream_id.stream_name())
        .fetch_one(&mut **tx)
        .await
        .map_err(store_err)?;

        if current != stream_id.stream_version() {
            return Err(DomainError::ConcurrencyConflict {
                stream_name: stream_id.stream_name().to_owned(),
                expected: stream_id.stream_version(),
                actual: current,
            });
        }

        let (mut global_sequence,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(global_sequence), 0) FROM stored_events")
                .fetch_one(&mut **tx)
                .await
                .map_err(store_err)?;

        let mut version = current;
        let mut appended = Vec::with_capacity(events.len());
        for pending in events {
            version += 1;
            global_sequence += 1;
            let stored = pending.into_stored(stream_id.stream_name(), version, global_sequence);

            sqlx::query(
                r"
                INSERT INTO stored_events
                    (global_sequence, event_id, stream_name, stream_version, event_type,
                     metadata_version, occurred_on, payload, correlation_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(stored.global_sequence)
            .bind(stored.event_id)
            .bind(&stored.stream_name)
            .bind(stored.stream_version)
            .bind(&stored.event_type)
            .bind(stored.metadata_version)
            .bind(stored.occurred_on)
            .bind(&stored.payload)
            .bind(stored.correlation_id)
            .execute(&mut **tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DomainError::ConcurrencyConflict {
                        stream_name: stream_id.stream_name().to_owned(),
                        expected: stream_id.stream_version(),
                        actual: version,
                    }
                } else {
                    store_err(err)
                }
            })?;

            appended.push(stored);
        }

        debug!(
            stream = %stream_id,
            appended = appended.len(),
            version,
            "appended events"
        );

        Ok(EventStream {
            stream_name: stream_id.stream_name().to_owned(),
            version,
            events: appended,
        })
    }

    async fn save_dispatch_cursor(&mut self, cursor: &DispatchCursor) -> Result<(), DomainError> {
        let tx = self.open()?;
        sqlx::query(
            r"
            INSERT INTO dispatch_cursors AS c (dispatcher_id, last_dispatched_global_sequence)
            VALUES ($1, $2)
            ON CONFLICT (dispatcher_id) DO UPDATE
            SET last_dispatched_global_sequence =
                    GREATEST(c.last_dispatched_global_sequence,
                             EXCLUDED.last_dispatched_global_sequence),
                updated_at = NOW()
            ",
        )
        .bind(&cursor.dispatcher_id)
        .bind(cursor.last_dispatched_global_sequence)
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn save_published_tracker(
        &mut self,
        tracker: &PublishedNotificationTracker,
    ) -> Result<PublishedNotificationTracker, DomainError> {
        let tx = self.open()?;
        let saved: Option<(i64, i32)> = sqlx::query_as(
            r"
            INSERT INTO published_notification_trackers AS t
                (type_name, most_recent_published_notification_id, concurrency_version)
            VALUES ($1, $2, 1)
            ON CONFLICT (type_name) DO UPDATE
            SET most_recent_published_notification_id =
                    GREATEST(t.most_recent_published_notification_id,
                             EXCLUDED.most_recent_published_notification_id),
                concurrency_version = t.concurrency_version + 1
            WHERE t.concurrency_version = $3
            RETURNING most_recent_published_notification_id, concurrency_version
            ",
        )
        .bind(&tracker.type_name)
        .bind(tracker.most_recent_published_notification_id)
        .bind(tracker.concurrency_version)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_err)?;

        if let Some((most_recent, concurrency_version)) = saved {
            return Ok(PublishedNotificationTracker {
                type_name: tracker.type_name.clone(),
                most_recent_published_notification_id: most_recent,
                concurrency_version,
            });
        }

        let (actual,): (i32,) = sqlx::query_as(
            "SELECT concurrency_version FROM published_notification_trackers WHERE type_name = $1",
        )
        .bind(&tracker.type_name)
        .fetch_one(&mut **tx)
        .await
        .map_err(store_err)?;

        Err(DomainError::ConcurrencyConflict {
            stream_name: tracker.type_name.clone(),
            expected: i64::from(tracker.concurrency_version),
            actual: i64::from(actual),
        })
    }

    async fn append_notification(
        &mut self,
        exchange_name: &str,
        event: &StoredEvent,
    ) -> Result<Option<Notification>, DomainError> {
        let tx = self.open()?;
        let assigned: Option<(i64,)> = sqlx::query_as(
            r"
            INSERT INTO notifications
                (exchange_name, notification_id, global_sequence, type_name,
                 occurred_on, version, event)
            SELECT $1, COALESCE(MAX(notification_id), 0) + 1, $2, $3, $4, $5, $6
            FROM notifications
            WHERE exchange_name = $1
            ON CONFLICT (exchange_name, global_sequence) DO NOTHING
            RETURNING notification_id
            ",
        )
        .bind(exchange_name)
        .bind(event.global_sequence)
        .bind(&event.event_type)
        .bind(event.occurred_on)
        .bind(event.metadata_version)
        .bind(&event.payload)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_err)?;

        Ok(assigned.map(|(id,)| Notification::from_stored_event(id, event)))
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::StoreUnavailable("transaction already closed".into()))?;
        tx.commit().await.map_err(store_err)
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DomainError::StoreUnavailable("transaction already closed".into()))?;
        tx.rollback().await.map_err(store_err)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis().max(1)))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(GLOBAL_SEQUENCE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_lock_timeout(&err) {
                    writer_busy()
                } else {
                    store_err(err)
                }
            })?;

        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }

    async fn stream_for(
        &self,
        stream_name: &str,
        since_version: i64,
    ) -> Result<EventStream, DomainError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        let (version,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(stream_version), 0) FROM stored_events WHERE stream_name = $1",
        )
        .bind(stream_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        let rows = sqlx::query_as::<_, EventRow>(
            r"
            SELECT global_sequence, event_id, stream_name, stream_version, event_type,
                   metadata_version, occurred_on, payload, correlation_id
            FROM stored_events
            WHERE stream_name = $1 AND stream_version > $2
            ORDER BY stream_version ASC
            ",
        )
        .bind(stream_name)
        .bind(since_version)
        .fetch_all(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        Ok(EventStream {
            stream_name: stream_name.to_owned(),
            version,
            events: rows.into_iter().map(StoredEvent::from).collect(),
        })
    }

    async fn events_since(&self, global_sequence: i64) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"
            SELECT global_sequence, event_id, stream_name, stream_version, event_type,
                   metadata_version, occurred_on, payload, correlation_id
            FROM stored_events
            WHERE global_sequence > $1
            ORDER BY global_sequence ASC
            ",
        )
        .bind(global_sequence)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn max_global_sequence(&self) -> Result<i64, DomainError> {
        let (max,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(global_sequence), 0) FROM stored_events")
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(max)
    }
}

#[async_trait]
impl CursorStore for PgStore {
    async fn dispatch_cursor(&self, dispatcher_id: &str) -> Result<DispatchCursor, DomainError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT last_dispatched_global_sequence FROM dispatch_cursors WHERE dispatcher_id = $1",
        )
        .bind(dispatcher_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(match row {
            Some((last,)) => DispatchCursor {
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
        let row: Option<(i64, i32)> = sqlx::query_as(
            r"
            SELECT most_recent_published_notification_id, concurrency_version
            FROM published_notification_trackers
            WHERE type_name = $1
            ",
        )
        .bind(type_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(match row {
            Some((most_recent, concurrency_version)) => PublishedNotificationTracker {
                type_name: type_name.to_owned(),
                most_recent_published_notification_id: most_recent,
                concurrency_version,
            },
            None => PublishedNotificationTracker::initial(type_name),
        })
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn count_notifications(&self, exchange_name: &str) -> Result<i64, DomainError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE exchange_name = $1")
                .bind(exchange_name)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(count)
    }

    async fn notifications_between(
        &self,
        exchange_name: &str,
        low: i64,
        high: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r"
            SELECT notification_id, type_name, occurred_on, version, event
            FROM notifications
            WHERE exchange_name = $1 AND notification_id BETWEEN $2 AND $3
            ORDER BY notification_id ASC
            ",
        )
        .bind(exchange_name)
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn notifications_since(
        &self,
        exchange_name: &str,
        notification_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, DomainError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r"
            SELECT notification_id, type_name, occurred_on, version, event
            FROM notifications
            WHERE exchange_name = $1 AND notification_id > $2
            ORDER BY notification_id ASC
            LIMIT $3
            ",
        )
        .bind(exchange_name)
        .bind(notification_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }
}

#[async_trait]
impl Purge for PgStore {
    async fn purge(&self) -> Result<(), DomainError> {
        sqlx::query(
            "TRUNCATE notifications, published_notification_trackers, dispatch_cursors, stored_events",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
