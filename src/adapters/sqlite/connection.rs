//! Pool construction for the fieldflow database.
//!
//! Every connection runs in WAL mode with a long busy timeout: the queue is
//! the coordination point between concurrent HTTP handlers, sweeps and
//! workers, and its conditional updates must wait out short write locks
//! instead of failing.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::domain::models::config::DatabaseConfig;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid database URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Cannot create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot open database: {0}")]
    Open(#[source] sqlx::Error),
}

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn with_max_connections(max_connections: u32) -> Self {
        Self {
            max_connections: max_connections.max(1),
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self::with_max_connections(config.max_connections)
    }
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, ConnectionError> {
    let options = SqliteConnectOptions::from_str(url).map_err(|source| ConnectionError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT))
}

/// Filesystem path behind a `sqlite:` URL; `None` for in-memory databases.
fn database_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty() && path != ":memory:").then_some(Path::new(path))
}

/// Open the database at `url`, creating the file and its directory if needed.
pub async fn create_pool(url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, ConnectionError> {
    let config = config.unwrap_or_default();

    if let Some(dir) = database_file(url).and_then(Path::parent) {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|source| ConnectionError::Directory {
                path: dir.display().to_string(),
                source,
            })?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options(url)?.create_if_missing(true))
        .await
        .map_err(ConnectionError::Open)?;

    tracing::debug!(url, max_connections = config.max_connections, "Opened database pool");
    Ok(pool)
}

/// Single-connection in-memory pool; every query sees the same database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(MEMORY_URL)?.shared_cache(true))
        .await
        .map_err(ConnectionError::Open)
}
