//! Shared application state.

use std::sync::Arc;

use herald_core::clock::Clock;
use herald_core::store::Storage;
use herald_notification::NotificationLogFactory;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event, cursor and notification storage.
    pub storage: Arc<dyn Storage>,
    /// Clock stamping new events.
    pub clock: Arc<dyn Clock>,
    /// Serves the exchange's notification log pages.
    pub notification_logs: Arc<NotificationLogFactory>,
    /// Exchange the log and publisher serve.
    pub exchange_name: String,
    /// Cursor id of the root dispatcher.
    pub dispatcher_id: String,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        exchange_name: impl Into<String>,
        dispatcher_id: impl Into<String>,
        notifications_per_log: i64,
    ) -> Self {
        let exchange_name = exchange_name.into();
        let notification_logs = Arc::new(NotificationLogFactory::new(
            exchange_name.clone(),
            notifications_per_log,
            Arc::clone(&storage),
        ));
        Self {
            storage,
            clock,
            notification_logs,
            exchange_name,
            dispatcher_id: dispatcher_id.into(),
        }
    }
}
