//! Event store database schema.
//!
//! Tables: `stored_events`, `dispatch_cursors`,
//! `published_notification_trackers` and `notifications`. The SQL lives in
//! the workspace `migrations/` directory.

use sqlx::migrate::Migrator;

/// Embedded migrations, applied at startup by the API server.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Advisory lock key serializing writer transactions.
pub(crate) const GLOBAL_SEQUENCE_LOCK: i64 = 0x4845_5241_4c44;
