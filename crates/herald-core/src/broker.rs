//! Message broker port.
//!
//! The broker client itself lives outside Herald. The publisher only relies
//! on durable, best-effort ordered, at-least-once delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;

/// Per-message send options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageParameters {
    /// The notification's type name, usable for routing.
    pub type_name: String,
    /// Deduplication key; the notification id as text.
    pub message_id: String,
    /// When the underlying event happened.
    pub timestamp: DateTime<Utc>,
    /// Whether the broker must persist the message.
    pub durable: bool,
}

impl MessageParameters {
    /// Parameters for a durable text message.
    #[must_use]
    pub fn durable_text(
        type_name: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message_id: message_id.into(),
            timestamp,
            durable: true,
        }
    }
}

/// Sends serialized notifications to an exchange.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Sends one message. Must not return before the broker has accepted it.
    ///
    /// # Errors
    ///
    /// Returns an error when the broker rejects or cannot be reached.
    async fn send(
        &self,
        exchange_name: &str,
        message: &str,
        parameters: &MessageParameters,
    ) -> Result<(), DomainError>;
}
