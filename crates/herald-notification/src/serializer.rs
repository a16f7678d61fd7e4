//! Notification wire format.

use herald_core::error::DomainError;
use herald_core::notification::Notification;

/// Serializes a notification to the JSON text sent to the broker.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if encoding fails.
pub fn serialize(notification: &Notification) -> Result<String, DomainError> {
    Ok(serde_json::to_string(notification)?)
}

/// Parses JSON text produced by [`serialize`].
///
/// # Errors
///
/// Returns `DomainError::Serialization` if `text` is not a notification.
pub fn deserialize(text: &str) -> Result<Notification, DomainError> {
    Ok(serde_json::from_str(text)?)
}
