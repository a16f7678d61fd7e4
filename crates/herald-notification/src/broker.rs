//! Broker that only logs.

use async_trait::async_trait;
use tracing::info;

use herald_core::broker::{MessageParameters, MessageProducer};
use herald_core::error::DomainError;

/// A `MessageProducer` that accepts every message and logs it. Stands in
/// for a real broker client when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBroker;

#[async_trait]
impl MessageProducer for LoggingBroker {
    async fn send(
        &self,
        exchange_name: &str,
        message: &str,
        parameters: &MessageParameters,
    ) -> Result<(), DomainError> {
        info!(
            exchange = exchange_name,
            type_name = %parameters.type_name,
            message_id = %parameters.message_id,
            timestamp = %parameters.timestamp,
            durable = parameters.durable,
            bytes = message.len(),
            "notification sent"
        );
        Ok(())
    }
}
