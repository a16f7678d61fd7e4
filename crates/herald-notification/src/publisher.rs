//! Publishes recorded notifications to a message broker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use herald_core::broker::{MessageParameters, MessageProducer};
use herald_core::error::DomainError;
use herald_core::store::{CursorStore, NotificationStore, Storage};
use herald_core::unit_of_work::UnitOfWork;
use herald_dispatch::PeriodicTask;

use crate::serializer;

/// Sends an exchange's notifications to the broker in id order and tracks
/// the last one sent.
///
/// The tracker only moves after every notification in the batch has been
/// accepted. A failed send fails the whole call and the next call resends
/// from the tracker, so the broker may see a notification more than once;
/// consumers deduplicate on the notification id.
pub struct NotificationPublisher {
    exchange_name: String,
    storage: Arc<dyn Storage>,
    producer: Arc<dyn MessageProducer>,
    batch_size: i64,
}

impl NotificationPublisher {
    /// Creates a publisher sending at most `batch_size` notifications per
    /// call.
    #[must_use]
    pub fn new(
        exchange_name: impl Into<String>,
        storage: Arc<dyn Storage>,
        producer: Arc<dyn MessageProducer>,
        batch_size: i64,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            storage,
            producer,
            batch_size: batch_size.max(1),
        }
    }

    /// The exchange this publisher sends to and tracks.
    #[must_use]
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    /// Sends every notification past the tracker, then advances it.
    /// Returns the number sent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PublishFailure` if the broker rejects a send;
    /// the tracker is left where it was. Store errors, including a tracker
    /// `ConcurrencyConflict`, propagate as-is.
    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    pub async fn publish_notifications(&self) -> Result<usize, DomainError> {
        let mut unit_of_work = UnitOfWork::begun(self.storage.as_ref()).await?;
        match self.publish_batch(&mut unit_of_work).await {
            Ok(published) => {
                unit_of_work.success().await?;
                Ok(published)
            }
            Err(err) => Err(unit_of_work.fail(err).await),
        }
    }

    async fn publish_batch(&self, unit_of_work: &mut UnitOfWork) -> Result<usize, DomainError> {
        let tracker = self
            .storage
            .published_notification_tracker(&self.exchange_name)
            .await?;
        let notifications = self
            .storage
            .notifications_since(
                &self.exchange_name,
                tracker.most_recent_published_notification_id,
                self.batch_size,
            )
            .await?;
        let Some(last) = notifications.last() else {
            return Ok(0);
        };

        for notification in &notifications {
            let message = serializer::serialize(notification)?;
            let parameters = MessageParameters::durable_text(
                &notification.type_name,
                notification.notification_id.to_string(),
                notification.occurred_on,
            );
            self.producer
                .send(&self.exchange_name, &message, &parameters)
                .await
                .map_err(|err| DomainError::PublishFailure {
                    notification_id: notification.notification_id,
                    reason: err.to_string(),
                })?;
        }

        let saved = unit_of_work
            .transaction()?
            .save_published_tracker(&tracker.advanced_to(last.notification_id))
            .await?;

        info!(
            published = notifications.len(),
            most_recent = saved.most_recent_published_notification_id,
            "published notifications"
        );
        Ok(notifications.len())
    }
}

#[async_trait]
impl PeriodicTask for NotificationPublisher {
    fn name(&self) -> &str {
        &self.exchange_name
    }

    async fn run_once(&self) -> Result<usize, DomainError> {
        self.publish_notifications().await
    }
}
