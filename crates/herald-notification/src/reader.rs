//! Consumer-side reader for serialized notifications.
//!
//! Event fields are addressed by path, either dotted (`tenantId.id`) or
//! slash-separated with a leading slash (`/tenantId/id`). A path must end at
//! a scalar; a missing or `null` field reads as `None`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use herald_core::error::DomainError;

fn malformed(what: impl std::fmt::Display) -> DomainError {
    DomainError::Serialization(format!("malformed notification: {what}"))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Reads fields out of one notification's JSON representation.
#[derive(Debug, Clone)]
pub struct NotificationReader {
    representation: Value,
}

impl NotificationReader {
    /// Parses a serialized notification.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if `text` is not JSON or has no
    /// `event` object.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Wraps an already parsed representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if there is no `event` object.
    pub fn from_value(representation: Value) -> Result<Self, DomainError> {
        if !representation.get("event").is_some_and(Value::is_object) {
            return Err(malformed("missing event object"));
        }
        Ok(Self { representation })
    }

    /// The notification id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if absent or not an integer.
    pub fn notification_id(&self) -> Result<i64, DomainError> {
        self.top_level_text("notificationId")?
            .parse()
            .map_err(|_| malformed("notificationId is not an integer"))
    }

    /// The notification id as text, the broker deduplication key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if absent.
    pub fn notification_id_as_string(&self) -> Result<String, DomainError> {
        self.top_level_text("notificationId")
    }

    /// The event type name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if absent.
    pub fn type_name(&self) -> Result<String, DomainError> {
        self.top_level_text("typeName")
    }

    /// The event schema version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if absent or out of range.
    pub fn version(&self) -> Result<i32, DomainError> {
        self.top_level_text("version")?
            .parse()
            .map_err(|_| malformed("version is not an integer"))
    }

    /// When the event happened.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if absent or not epoch millis.
    pub fn occurred_on(&self) -> Result<DateTime<Utc>, DomainError> {
        let millis: i64 = self
            .top_level_text("occurredOn")?
            .parse()
            .map_err(|_| malformed("occurredOn is not epoch millis"))?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| malformed("occurredOn out of range"))
    }

    /// An event field as text.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the path ends at an object or
    /// array.
    pub fn event_string_value(&self, path: &str) -> Result<Option<String>, DomainError> {
        let mut current = &self.representation["event"];
        for key in Self::keys(path) {
            match current {
                Value::Object(fields) => match fields.get(key) {
                    Some(next) => current = next,
                    None => return Ok(None),
                },
                Value::Null => return Ok(None),
                _ => {
                    return Err(DomainError::Validation(format!(
                        "{path}: {key} is below a simple value"
                    )));
                }
            }
        }
        match current {
            Value::Null => Ok(None),
            Value::Array(_) | Value::Object(_) => Err(DomainError::Validation(format!(
                "{path}: last name must reference a simple value"
            ))),
            scalar => Ok(scalar_text(scalar)),
        }
    }

    /// An event field as an integer.
    ///
    /// # Errors
    ///
    /// As [`Self::event_string_value`], or `DomainError::Validation` if the
    /// value is not an integer.
    pub fn event_i64_value(&self, path: &str) -> Result<Option<i64>, DomainError> {
        self.event_parsed(path, |text| text.parse().ok())
    }

    /// An event field as a float.
    ///
    /// # Errors
    ///
    /// As [`Self::event_string_value`], or `DomainError::Validation` if the
    /// value is not numeric.
    pub fn event_f64_value(&self, path: &str) -> Result<Option<f64>, DomainError> {
        self.event_parsed(path, |text| text.parse().ok())
    }

    /// An event field as a boolean.
    ///
    /// # Errors
    ///
    /// As [`Self::event_string_value`], or `DomainError::Validation` if the
    /// value is not `true` or `false`.
    pub fn event_bool_value(&self, path: &str) -> Result<Option<bool>, DomainError> {
        self.event_parsed(path, |text| text.parse().ok())
    }

    /// An event field holding epoch millis, as a timestamp.
    ///
    /// # Errors
    ///
    /// As [`Self::event_string_value`], or `DomainError::Validation` if the
    /// value is not epoch millis.
    pub fn event_timestamp_value(&self, path: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        self.event_parsed(path, |text| {
            text.parse().ok().and_then(DateTime::from_timestamp_millis)
        })
    }

    fn event_parsed<T>(
        &self,
        path: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, DomainError> {
        match self.event_string_value(path)? {
            Some(text) => parse(&text)
                .map(Some)
                .ok_or_else(|| DomainError::Validation(format!("{path}: unexpected value {text}"))),
            None => Ok(None),
        }
    }

    fn top_level_text(&self, field: &str) -> Result<String, DomainError> {
        self.representation
            .get(field)
            .and_then(scalar_text)
            .ok_or_else(|| malformed(format!("missing {field}")))
    }

    fn keys(path: &str) -> impl Iterator<Item = &str> {
        let (trimmed, separator) = match path.strip_prefix('/') {
            Some(rest) => (rest, '/'),
            None => (path, '.'),
        };
        trimmed.split(separator)
    }
}
