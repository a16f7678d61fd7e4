//! Versioned event catalog.
//!
//! Each event kind is registered under its type tag with its current schema
//! version and one upgrade function per version step. Stored payloads written
//! by an older schema are upgraded step by step before deserialization;
//! payloads from a newer or unknown schema are reported, never coerced.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::event::StoredEvent;

/// Upgrades a payload from version `n` to version `n + 1`.
pub type UpgradeFn = fn(serde_json::Value) -> Result<serde_json::Value, DomainError>;

/// Schema registration for one event type.
#[derive(Debug, Clone)]
pub struct EventSchema {
    event_type: &'static str,
    current_version: i32,
    upgrades: BTreeMap<i32, UpgradeFn>,
}

impl EventSchema {
    /// Registers `event_type` at `current_version` with no upgrade path.
    #[must_use]
    pub fn new(event_type: &'static str, current_version: i32) -> Self {
        Self {
            event_type,
            current_version,
            upgrades: BTreeMap::new(),
        }
    }

    /// Adds the upgrade from `from_version` to `from_version + 1`.
    #[must_use]
    pub fn with_upgrade(mut self, from_version: i32, upgrade: UpgradeFn) -> Self {
        self.upgrades.insert(from_version, upgrade);
        self
    }

    /// The event type tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// The version this process writes and reads natively.
    #[must_use]
    pub fn current_version(&self) -> i32 {
        self.current_version
    }

    /// Brings a payload written at `found_version` up to the current version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::VersionMismatch` if `found_version` is newer than
    /// the current version, not positive, or a step in between has no
    /// registered upgrade.
    pub fn upgrade(
        &self,
        found_version: i32,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        if found_version < 1 || found_version > self.current_version {
            return Err(self.mismatch(found_version));
        }

        let mut payload = payload;
        for version in found_version..self.current_version {
            let step = self
                .upgrades
                .get(&version)
                .ok_or_else(|| self.mismatch(found_version))?;
            payload = step(payload)?;
        }
        Ok(payload)
    }

    fn mismatch(&self, found: i32) -> DomainError {
        DomainError::VersionMismatch {
            event_type: self.event_type.to_owned(),
            found,
            supported: self.current_version,
        }
    }
}

/// Registry of every event type a bounded context can read.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    schemas: HashMap<&'static str, EventSchema>,
}

impl EventCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, replacing any previous registration for its type.
    #[must_use]
    pub fn with_schema(mut self, schema: EventSchema) -> Self {
        self.schemas.insert(schema.event_type, schema);
        self
    }

    /// Looks up a registered schema.
    #[must_use]
    pub fn schema(&self, event_type: &str) -> Option<&EventSchema> {
        self.schemas.get(event_type)
    }

    /// Returns `true` if `event_type` is registered.
    #[must_use]
    pub fn knows(&self, event_type: &str) -> bool {
        self.schemas.contains_key(event_type)
    }

    /// Returns the stored payload upgraded to the current schema version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for unregistered types and
    /// `DomainError::VersionMismatch` when no upgrade path exists.
    pub fn upgraded_payload(&self, event: &StoredEvent) -> Result<serde_json::Value, DomainError> {
        let schema = self
            .schema(&event.event_type)
            .ok_or_else(|| DomainError::UnknownEventType(event.event_type.clone()))?;
        schema.upgrade(event.metadata_version, event.payload.clone())
    }

    /// Upgrades and deserializes a stored event body.
    ///
    /// # Errors
    ///
    /// As `upgraded_payload`, plus `DomainError::Serialization` when the
    /// upgraded payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self, event: &StoredEvent) -> Result<T, DomainError> {
        let payload = self.upgraded_payload(event)?;
        Ok(serde_json::from_value(payload)?)
    }
}
