//! Herald: sample Agile PM bounded context.
//!
//! A `Product` aggregate with a backlog, persisted through the event store so
//! that its events flow into the notification log.

pub mod application;
pub mod domain;

pub use domain::events::catalog;
