//! Herald API server entry point.

use std::sync::Arc;
use std::time::Duration;

use herald_api::config::{Config, StoreKind};
use herald_api::error::AppError;
use herald_api::pipeline::Pipeline;
use herald_api::state::AppState;
use herald_core::clock::SystemClock;
use herald_core::store::Storage;
use herald_event_store::schema::MIGRATOR;
use herald_event_store::{InMemoryStore, PgStore};
use herald_notification::LoggingBroker;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long the scheduler gets to finish its in-flight tick on shutdown.
const SCHEDULER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>, AppError> {
    match config.store {
        StoreKind::Memory => {
            warn!("using the in-memory store; nothing survives a restart");
            Ok(Arc::new(InMemoryStore::new().with_lock_timeout(config.lock_timeout)))
        }
        StoreKind::Postgres => {
            let database_url = config.database_url.as_deref().ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".to_owned())
            })?;
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await?;
            MIGRATOR
                .run(&pool)
                .await
                .map_err(|e| AppError::Database(sqlx::Error::Migrate(Box::new(e))))?;
            info!("database migrations applied");
            Ok(Arc::new(PgStore::new(pool).with_lock_timeout(config.lock_timeout)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Herald API server");

    let config = Config::from_env()?;
    let storage = open_storage(&config).await?;

    let pipeline = Pipeline::new(
        &storage,
        Arc::new(LoggingBroker),
        &config.exchange_name,
        &config.dispatcher_id,
        config.publish_batch_size,
    )
    .map_err(|e| AppError::Config(format!("invalid dispatcher wiring: {e}")))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = pipeline.scheduler(config.tick_interval).spawn(shutdown_rx);

    let app_state = AppState::new(
        Arc::clone(&storage),
        Arc::new(SystemClock),
        config.exchange_name.clone(),
        config.dispatcher_id.clone(),
        config.notifications_per_log,
    );
    let app = herald_api::app(app_state);

    let addr = config.listen_addr()?;
    info!(%addr, exchange = %config.exchange_name, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Receivers gone means the scheduler already stopped.
            let _ = shutdown_tx.send(true);
        })
        .await;

    match tokio::time::timeout(SCHEDULER_DRAIN_TIMEOUT, scheduler).await {
        Ok(Ok(())) => info!("scheduler drained"),
        Ok(Err(err)) => error!(error = %err, "scheduler task panicked"),
        Err(_) => warn!("scheduler did not stop in time"),
    }

    served?;
    info!("Herald API server stopped");
    Ok(())
}
