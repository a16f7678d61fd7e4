//! Herald Event Store: `PostgreSQL` and in-memory storage backends.
//!
//! Both backends implement every storage trait in `herald_core::store`:
//! events and the global feed, dispatch cursors, publisher trackers and the
//! per-exchange notification logs.

use std::time::Duration;

use herald_core::error::DomainError;
use herald_core::unit_of_work::UnitOfWorkState;

pub mod memory;
pub mod pg;
pub mod schema;

pub use memory::InMemoryStore;
pub use pg::PgStore;

/// How long a new transaction waits for the open one to close.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Another unit of work still holds the store's writer lock.
pub(crate) fn writer_busy() -> DomainError {
    DomainError::UnitOfWork {
        operation: "begin",
        state: UnitOfWorkState::Active,
    }
}
