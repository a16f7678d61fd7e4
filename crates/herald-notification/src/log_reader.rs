//! Consumer-side reader for notification log pages.
//!
//! A consumer starts at the current page (`/notifications`) and follows
//! `linkPrevious` back to the last page it fully processed. Archived pages
//! never change, so a consumer may keep them once read.

use serde::Deserialize;
use serde_json::Value;

use herald_core::error::DomainError;
use herald_core::notification::NotificationLogId;

use crate::reader::NotificationReader;

/// A hypermedia link between log pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogLink {
    /// Path of the linked page, ending in its `low,high` id.
    pub href: String,
    /// `self`, `next` or `previous`.
    pub rel: String,
}

impl LogLink {
    /// The id of the linked page, taken from the last path segment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the href does not end in a
    /// `low,high` id.
    pub fn log_id(&self) -> Result<NotificationLogId, DomainError> {
        self.href
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .parse()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    id: String,
    archived: bool,
    #[serde(default)]
    notifications: Vec<Value>,
    link_self: Option<LogLink>,
    link_next: Option<LogLink>,
    link_previous: Option<LogLink>,
}

/// Reads one notification log page.
#[derive(Debug, Clone)]
pub struct NotificationLogReader {
    id: String,
    archived: bool,
    notifications: Vec<NotificationReader>,
    link_self: Option<LogLink>,
    link_next: Option<LogLink>,
    link_previous: Option<LogLink>,
}

impl NotificationLogReader {
    /// Parses a serialized log page.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if `text` is not a log page or
    /// one of its notifications is malformed.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Wraps an already parsed log page.
    ///
    /// # Errors
    ///
    /// As [`Self::parse`].
    pub fn from_value(representation: Value) -> Result<Self, DomainError> {
        let page: Page = serde_json::from_value(representation)?;
        let notifications = page
            .notifications
            .into_iter()
            .map(NotificationReader::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: page.id,
            archived: page.archived,
            notifications,
            link_self: page.link_self,
            link_next: page.link_next,
            link_previous: page.link_previous,
        })
    }

    /// The page id as sent, `"low,high"`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The page id, parsed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the id is malformed.
    pub fn log_id(&self) -> Result<NotificationLogId, DomainError> {
        self.id.parse()
    }

    /// `true` once the page is full and will never change.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// Notifications on the page, in id order.
    #[must_use]
    pub fn notifications(&self) -> &[NotificationReader] {
        &self.notifications
    }

    /// Number of notifications on the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Returns `true` if the page holds no notifications yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Link to this page.
    #[must_use]
    pub fn self_link(&self) -> Option<&LogLink> {
        self.link_self.as_ref()
    }

    /// Link to the following page; present once this page is archived.
    #[must_use]
    pub fn next(&self) -> Option<&LogLink> {
        self.link_next.as_ref()
    }

    /// Link to the preceding page; absent on the first page.
    #[must_use]
    pub fn previous(&self) -> Option<&LogLink> {
        self.link_previous.as_ref()
    }

    /// Returns `true` if there is a following page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.link_next.is_some()
    }

    /// Returns `true` if there is a preceding page.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.link_previous.is_some()
    }
}

impl<'a> IntoIterator for &'a NotificationLogReader {
    type Item = &'a NotificationReader;
    type IntoIter = std::slice::Iter<'a, NotificationReader>;

    fn into_iter(self) -> Self::IntoIter {
        self.notifications.iter()
    }
}
