//! Herald Notification: turning dispatched events into notifications.
//!
//! `NotificationLogDispatcher` numbers events per exchange as they are
//! dispatched. `NotificationLogFactory` serves the numbered notifications as
//! fixed-size, eventually immutable log pages for pull-based consumers, and
//! `NotificationPublisher` pushes them to a message broker, remembering how
//! far it got. `NotificationReader` and `NotificationLogReader` are the
//! consumer side of the pull protocol.

pub mod broker;
pub mod log_dispatcher;
pub mod log_factory;
pub mod log_reader;
pub mod publisher;
pub mod reader;
pub mod serializer;

pub use broker::LoggingBroker;
pub use log_dispatcher::NotificationLogDispatcher;
pub use log_factory::NotificationLogFactory;
pub use log_reader::NotificationLogReader;
pub use publisher::NotificationPublisher;
pub use reader::NotificationReader;

/// Default number of notifications per log page.
pub const NOTIFICATIONS_PER_LOG: i64 = 20;
