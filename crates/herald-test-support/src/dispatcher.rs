//! Test dispatchers: `EventDispatcher` doubles for dispatcher-chain tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use herald_core::dispatcher::EventDispatcher;
use herald_core::error::DomainError;
use herald_core::event::StoredEvent;
use herald_core::store::StoreTransaction;

/// A dispatcher that records every event it is handed. Understands every
/// event unless restricted to a set of event types.
#[derive(Debug)]
pub struct RecordingDispatcher {
    name: String,
    event_types: Option<Vec<String>>,
    dispatched: Mutex<Vec<StoredEvent>>,
}

impl RecordingDispatcher {
    /// A recorder that understands every event.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            event_types: None,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// A recorder that understands only the given event types.
    #[must_use]
    pub fn only(name: &str, event_types: &[&str]) -> Self {
        Self {
            event_types: Some(event_types.iter().map(|&t| t.to_owned()).collect()),
            ..Self::new(name)
        }
    }

    /// Returns a snapshot of every dispatched event.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dispatched(&self) -> Vec<StoredEvent> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Global sequences of every dispatched event, in dispatch order.
    pub fn dispatched_sequences(&self) -> Vec<i64> {
        self.dispatched()
            .iter()
            .map(|e| e.global_sequence)
            .collect()
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn understands(&self, event: &StoredEvent) -> bool {
        self.event_types
            .as_ref()
            .is_none_or(|types| types.contains(&event.event_type))
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        _transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        self.dispatched.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A dispatcher that fails on one global sequence until healed, recording
/// every attempt.
#[derive(Debug)]
pub struct FailingDispatcher {
    fail_on: i64,
    healed: AtomicBool,
    attempts: Mutex<Vec<i64>>,
}

impl FailingDispatcher {
    /// Fails whenever it is handed the event at `fail_on`.
    #[must_use]
    pub fn new(fail_on: i64) -> Self {
        Self {
            fail_on,
            healed: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Stops failing.
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    /// Global sequences of every attempted dispatch, including the failed one.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> Vec<i64> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventDispatcher for FailingDispatcher {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn understands(&self, _event: &StoredEvent) -> bool {
        true
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        _transaction: &mut dyn StoreTransaction,
    ) -> Result<(), DomainError> {
        self.attempts.lock().unwrap().push(event.global_sequence);
        if event.global_sequence == self.fail_on && !self.healed.load(Ordering::SeqCst) {
            return Err(DomainError::StoreUnavailable("downstream unavailable".into()));
        }
        Ok(())
    }
}
