//! Notifications and notification log pages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::event::StoredEvent;

/// Outward-facing, numbered, immutable envelope around one stored event.
///
/// Serializes to the wire format consumers read: `notificationId`,
/// `typeName`, `occurredOn` (epoch millis as a string), `version` and the
/// event body under `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Dense, per-exchange id starting at 1.
    pub notification_id: i64,
    /// Fully qualified event kind.
    pub type_name: String,
    /// When the underlying event happened.
    #[serde(with = "epoch_millis")]
    pub occurred_on: DateTime<Utc>,
    /// Schema version of the event body.
    pub version: i32,
    /// The event's own serialized fields.
    pub event: serde_json::Value,
}

impl Notification {
    /// Wraps a stored event as notification `notification_id`.
    #[must_use]
    pub fn from_stored_event(notification_id: i64, event: &StoredEvent) -> Self {
        Self {
            notification_id,
            type_name: event.event_type.clone(),
            occurred_on: event.occurred_on,
            version: event.metadata_version,
            event: event.payload.clone(),
        }
    }
}

/// Timestamps as epoch-millisecond strings, for exact round trips.
pub mod epoch_millis {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Text(String),
        Number(i64),
    }

    /// Serializes `value` as a millisecond string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.timestamp_millis().to_string())
    }

    /// Accepts either a millisecond string or a millisecond number.
    ///
    /// # Errors
    ///
    /// Fails on non-numeric text or out-of-range values.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let millis = match Millis::deserialize(deserializer)? {
            Millis::Text(text) => text.parse::<i64>().map_err(D::Error::custom)?,
            Millis::Number(n) => n,
        };
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {millis}")))
    }
}

/// Identifies a notification log page by its inclusive id range, encoded as
/// `"low,high"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationLogId {
    low: i64,
    high: i64,
}

impl NotificationLogId {
    /// Creates a log id for the inclusive range `low..=high`.
    #[must_use]
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    /// The first page for the given page size.
    #[must_use]
    pub fn first(notifications_per_log: i64) -> Self {
        Self::new(1, notifications_per_log)
    }

    /// The page containing the most recent of `count` notifications. When no
    /// notifications exist yet this is the first page.
    #[must_use]
    pub fn current(count: i64, notifications_per_log: i64) -> Self {
        let mut remainder = count % notifications_per_log;
        if remainder == 0 && count > 0 {
            remainder = notifications_per_log;
        }
        let low = count - remainder + 1;
        Self::new(low, low + notifications_per_log - 1)
    }

    /// Lowest notification id on the page.
    #[must_use]
    pub fn low(&self) -> i64 {
        self.low
    }

    /// Highest notification id the page can hold.
    #[must_use]
    pub fn high(&self) -> i64 {
        self.high
    }

    /// The `"low,high"` encoding used in URLs and representations.
    #[must_use]
    pub fn encoded(&self) -> String {
        format!("{},{}", self.low, self.high)
    }

    /// The following page.
    #[must_use]
    pub fn next(&self, notifications_per_log: i64) -> Option<Self> {
        let low = self.high + 1;
        let next = Self::new(low, low + notifications_per_log - 1);
        (next != *self).then_some(next)
    }

    /// The preceding page, or `None` for the first page.
    #[must_use]
    pub fn previous(&self, notifications_per_log: i64) -> Option<Self> {
        let low = (self.low - notifications_per_log).max(1);
        let previous = Self::new(low, low + notifications_per_log - 1);
        (previous != *self).then_some(previous)
    }

    /// Returns `true` if this id lies on a page boundary for the page size.
    #[must_use]
    pub fn is_aligned(&self, notifications_per_log: i64) -> bool {
        self.low >= 1
            && (self.low - 1) % notifications_per_log == 0
            && self.high - self.low + 1 == notifications_per_log
    }
}

impl fmt::Display for NotificationLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.low, self.high)
    }
}

impl FromStr for NotificationLogId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::Validation(format!("invalid notification log id: {s}"));
        let (low, high) = s.split_once(',').ok_or_else(invalid)?;
        let low = low.trim().parse::<i64>().map_err(|_| invalid())?;
        let high = high.trim().parse::<i64>().map_err(|_| invalid())?;
        if low < 1 || high < low {
            return Err(invalid());
        }
        Ok(Self::new(low, high))
    }
}

/// One page of an exchange's notification log.
///
/// Once `archived` is `true` the page's contents never change.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationLog {
    /// This page.
    pub id: NotificationLogId,
    /// The following page; present only once this page is archived.
    pub next: Option<NotificationLogId>,
    /// The preceding page; absent on the first page.
    pub previous: Option<NotificationLogId>,
    /// Notifications on the page in ascending id order.
    pub notifications: Vec<Notification>,
    /// `true` once the page is full and immutable.
    pub archived: bool,
}

impl NotificationLog {
    /// Number of notifications on the page.
    #[must_use]
    pub fn total_notifications(&self) -> usize {
        self.notifications.len()
    }
}
