//! Builds notification log pages.

use std::sync::Arc;

use herald_core::error::DomainError;
use herald_core::notification::{NotificationLog, NotificationLogId};
use herald_core::store::{NotificationStore, Storage};

/// Serves one exchange's notifications as fixed-size pages.
///
/// Pages are `low..=high` id ranges aligned to the page size. The current
/// page holds the most recent notification. A page is archived once a
/// notification beyond it exists, after which its contents never change;
/// only archived pages link to the next page.
pub struct NotificationLogFactory {
    exchange_name: String,
    notifications_per_log: i64,
    storage: Arc<dyn Storage>,
}

impl NotificationLogFactory {
    /// Creates a factory for `exchange_name` with pages of
    /// `notifications_per_log` (at least 1).
    #[must_use]
    pub fn new(
        exchange_name: impl Into<String>,
        notifications_per_log: i64,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            notifications_per_log: notifications_per_log.max(1),
            storage,
        }
    }

    /// The page size.
    #[must_use]
    pub fn notifications_per_log(&self) -> i64 {
        self.notifications_per_log
    }

    /// The page containing the most recent notification.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoreUnavailable` on store failure.
    pub async fn current_notification_log(&self) -> Result<NotificationLog, DomainError> {
        let count = self
            .storage
            .count_notifications(&self.exchange_name)
            .await?;
        let id = NotificationLogId::current(count, self.notifications_per_log);
        self.log_for(id, count).await
    }

    /// The page identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `id` is not a page boundary for
    /// this page size, `DomainError::AggregateNotFound` if the page lies past
    /// the current page, and `DomainError::StoreUnavailable` on store failure.
    pub async fn notification_log(
        &self,
        id: NotificationLogId,
    ) -> Result<NotificationLog, DomainError> {
        if !id.is_aligned(self.notifications_per_log) {
            return Err(DomainError::Validation(format!(
                "notification log id {id} is not aligned to pages of {}",
                self.notifications_per_log
            )));
        }

        let count = self
            .storage
            .count_notifications(&self.exchange_name)
            .await?;
        let current = NotificationLogId::current(count, self.notifications_per_log);
        if id.low() > current.low() {
            return Err(DomainError::AggregateNotFound(format!(
                "notification log {id}"
            )));
        }

        self.log_for(id, count).await
    }

    async fn log_for(
        &self,
        id: NotificationLogId,
        count: i64,
    ) -> Result<NotificationLog, DomainError> {
        let notifications = self
            .storage
            .notifications_between(&self.exchange_name, id.low(), id.high())
            .await?;
        let archived = count > id.high();

        Ok(NotificationLog {
            id,
            next: if archived {
                id.next(self.notifications_per_log)
            } else {
                None
            },
            previous: id.previous(self.notifications_per_log),
            notifications,
            archived,
        })
    }
}
