//! `fieldflow migrate`: create the database and apply pending migrations.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::{initialize_database, Migrator, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateOutput {
    pub database: String,
    pub schema_version: i64,
}

impl CommandOutput for MigrateOutput {
    fn to_human(&self) -> String {
        format!("Database {} is at schema version {}", self.database, self.schema_version)
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let url = config.database.url();
    let pool = initialize_database(&url, Some(PoolConfig::with_max_connections(1)))
        .await
        .with_context(|| format!("Failed to initialize database at {url}"))?;

    let schema_version = Migrator::new(pool.clone())
        .get_current_version()
        .await
        .context("Failed to read schema version")?;
    pool.close().await;

    output(
        &MigrateOutput {
            database: config.database.path.clone(),
            schema_version,
        },
        json_mode,
    );
    Ok(())
}
