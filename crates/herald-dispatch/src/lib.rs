//! Herald Dispatch: the event dispatcher chain.
//!
//! `EventStoreDispatcher` is the root: on every tick it reads its cursor,
//! pulls the undispatched events from the feed and hands each to its
//! registered children inside one transaction that also advances the
//! cursor. `Scheduler` drives roots and publishers on a fixed interval.

pub mod bus;
pub mod composite;
pub mod root;
pub mod scheduler;

pub use bus::EventBusDispatcher;
pub use composite::CompositeDispatcher;
pub use root::EventStoreDispatcher;
pub use scheduler::{PeriodicTask, Scheduler};
