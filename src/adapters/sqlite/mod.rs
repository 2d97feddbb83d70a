//! SQLite adapters for the automation engine.

pub mod connection;
pub mod entity_repository;
pub mod migrations;
pub mod queue_repository;
pub mod rule_repository;
pub mod trigger_repository;

pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use entity_repository::SqliteEntityRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use queue_repository::SqliteQueueRepository;
pub use rule_repository::SqliteRuleRepository;
pub use trigger_repository::SqliteTriggerRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Fixed-width UTC timestamp, so stored values compare correctly as text.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_optional_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse a JSON string from a SQLite row field, falling back to the type's default.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(s: Option<String>) -> DomainResult<T> {
    s.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(Option::unwrap_or_default)
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open (creating if needed) the database and apply pending migrations.
pub async fn initialize_database(
    database_url: &str,
    pool_config: Option<PoolConfig>,
) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, pool_config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
