//! Test brokers: `MessageProducer` doubles for publisher tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use herald_core::broker::{MessageParameters, MessageProducer};
use herald_core::error::DomainError;

/// One message accepted by a test broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target exchange.
    pub exchange_name: String,
    /// Serialized notification.
    pub message: String,
    /// Send options.
    pub parameters: MessageParameters,
}

/// A broker that accepts and records every message.
#[derive(Debug, Default)]
pub struct RecordingBroker {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingBroker {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every accepted message.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Message ids of every accepted message, in send order.
    pub fn sent_message_ids(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|m| m.parameters.message_id)
            .collect()
    }
}

#[async_trait]
impl MessageProducer for RecordingBroker {
    async fn send(
        &self,
        exchange_name: &str,
        message: &str,
        parameters: &MessageParameters,
    ) -> Result<(), DomainError> {
        self.sent.lock().unwrap().push(SentMessage {
            exchange_name: exchange_name.to_owned(),
            message: message.to_owned(),
            parameters: parameters.clone(),
        });
        Ok(())
    }
}

fn refused() -> DomainError {
    DomainError::StoreUnavailable("broker connection refused".into())
}

/// A broker that rejects sends until healed, recording the ones it accepts.
#[derive(Debug, Default)]
pub struct FailingBroker {
    fail_on_message_id: Option<String>,
    remaining_failures: Option<AtomicUsize>,
    healed: AtomicBool,
    accepted: RecordingBroker,
}

impl FailingBroker {
    /// Rejects only the message with `message_id`.
    #[must_use]
    pub fn on_message_id(message_id: &str) -> Self {
        Self {
            fail_on_message_id: Some(message_id.to_owned()),
            ..Self::default()
        }
    }

    /// Rejects the first `count` sends, then accepts everything.
    #[must_use]
    pub fn first_sends(count: usize) -> Self {
        Self {
            remaining_failures: Some(AtomicUsize::new(count)),
            ..Self::default()
        }
    }

    /// Stops failing.
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    /// Every accepted message.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.accepted.sent()
    }

    /// Message ids of every accepted message, in send order.
    pub fn sent_message_ids(&self) -> Vec<String> {
        self.accepted.sent_message_ids()
    }
}

#[async_trait]
impl MessageProducer for FailingBroker {
    async fn send(
        &self,
        exchange_name: &str,
        message: &str,
        parameters: &MessageParameters,
    ) -> Result<(), DomainError> {
        if let Some(remaining) = &self.remaining_failures {
            if remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(refused());
            }
            return self.accepted.send(exchange_name, message, parameters).await;
        }

        let targeted = self
            .fail_on_message_id
            .as_ref()
            .is_none_or(|id| *id == parameters.message_id);
        if targeted && !self.healed.load(Ordering::SeqCst) {
            return Err(refused());
        }
        self.accepted.send(exchange_name, message, parameters).await
    }
}
