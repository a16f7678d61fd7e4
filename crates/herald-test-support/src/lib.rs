//! Shared test doubles and builders for Herald crates.

mod broker;
mod clock;
mod dispatcher;
mod events;
mod store;

pub use broker::{FailingBroker, RecordingBroker, SentMessage};
pub use clock::FixedClock;
pub use dispatcher::{FailingDispatcher, RecordingDispatcher};
pub use events::{pending_event, pending_events, stored_event};
pub use store::{FailingCommitStore, UnavailableStore};
