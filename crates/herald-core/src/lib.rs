//! Herald Core: event-sourcing and notification abstractions.
//!
//! This crate defines the traits and value types shared by the event store,
//! the dispatcher chain and the notification publisher. It contains no
//! storage or transport code.

pub mod aggregate;
pub mod broker;
pub mod catalog;
pub mod clock;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod notification;
pub mod store;
pub mod stream;
pub mod unit_of_work;
