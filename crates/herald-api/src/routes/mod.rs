//! Route modules.

pub mod diagnostics;
pub mod health;
pub mod notifications;
pub mod products;
