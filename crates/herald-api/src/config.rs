//! Runtime configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Which storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// PostgreSQL through `sqlx`.
    Postgres,
    /// Process-local, non-durable store.
    Memory,
}

impl FromStr for StoreKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "HERALD_STORE must be `postgres` or `memory`, got `{other}`"
            ))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL; required for `StoreKind::Postgres`.
    pub database_url: Option<String>,
    /// Storage backend.
    pub store: StoreKind,
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Exchange the notification log and publisher serve.
    pub exchange_name: String,
    /// Cursor id of the root dispatcher.
    pub dispatcher_id: String,
    /// Interval between dispatch and publish ticks.
    pub tick_interval: Duration,
    /// Notification log page size.
    pub notifications_per_log: i64,
    /// Maximum notifications sent per publish tick.
    pub publish_batch_size: i64,
    /// Connection pool size.
    pub db_max_connections: u32,
    /// How long a unit of work waits for the store's writer lock.
    pub lock_timeout: Duration,
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a missing `DATABASE_URL` under the
    /// postgres store or any value that does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, applying defaults for
    /// unset keys.
    ///
    /// # Errors
    ///
    /// As [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let store: StoreKind = env_or("HERALD_STORE", "postgres").parse()?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL environment variable must be set".to_owned(),
            ));
        }

        let tick_interval_ms: u64 = positive(&lookup, "HERALD_TICK_INTERVAL_MS", 100)?;
        let lock_timeout_ms: u64 = positive(&lookup, "HERALD_LOCK_TIMEOUT_MS", 5000)?;

        Ok(Self {
            database_url,
            store,
            host: env_or("HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", 3000)?,
            exchange_name: env_or("HERALD_EXCHANGE_NAME", "herald.agilepm"),
            dispatcher_id: env_or("HERALD_DISPATCHER_ID", "herald.agilepm.dispatcher"),
            tick_interval: Duration::from_millis(tick_interval_ms),
            notifications_per_log: positive(&lookup, "HERALD_NOTIFICATIONS_PER_LOG", 20)?,
            publish_batch_size: positive(&lookup, "HERALD_PUBLISH_BATCH_SIZE", 100)?,
            db_max_connections: positive(&lookup, "HERALD_DB_MAX_CONNECTIONS", 10)?,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
        })
    }

    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw}): {e}"))),
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, key, default)?;
    if value <= T::default() {
        return Err(AppError::Config(format!("{key} must be positive, got {value}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_for_memory_store() {
        let config = config_from(&[("HERALD_STORE", "memory")]).unwrap();

        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.database_url, None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.exchange_name, "herald.agilepm");
        assert_eq!(config.dispatcher_id, "herald.agilepm.dispatcher");
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.notifications_per_log, 20);
        assert_eq!(config.publish_batch_size, 100);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.listen_addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_postgres_store_requires_database_url() {
        let result = config_from(&[]);

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_overrides_are_read() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/herald"),
            ("PORT", "8080"),
            ("HERALD_NOTIFICATIONS_PER_LOG", "2"),
            ("HERALD_TICK_INTERVAL_MS", "250"),
            ("HERALD_LOCK_TIMEOUT_MS", "750"),
        ])
        .unwrap();

        assert_eq!(config.store, StoreKind::Postgres);
        assert_eq!(config.port, 8080);
        assert_eq!(config.notifications_per_log, 2);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.lock_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        for pairs in [
            [("HERALD_STORE", "memory"), ("PORT", "eighty")],
            [("HERALD_STORE", "memory"), ("HERALD_NOTIFICATIONS_PER_LOG", "0")],
            [("HERALD_STORE", "memory"), ("HERALD_PUBLISH_BATCH_SIZE", "-5")],
            [("HERALD_STORE", "redis"), ("PORT", "3000")],
        ] {
            assert!(
                matches!(config_from(&pairs), Err(AppError::Config(_))),
                "expected config error for {pairs:?}"
            );
        }
    }
}
