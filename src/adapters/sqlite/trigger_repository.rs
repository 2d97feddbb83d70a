//! SQLite implementation of the TriggerRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_optional_datetime};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Trigger, TriggerType};
use crate::domain::ports::TriggerRepository;

#[derive(Clone)]
pub struct SqliteTriggerRepository {
    pool: SqlitePool,
}

impl SqliteTriggerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerRepository for SqliteTriggerRepository {
    async fn record_unless_recent(&self, trigger: &Trigger, since: DateTime<Utc>) -> DomainResult<bool> {
        let data_json = serde_json::to_string(&trigger.data)?;

        let result = sqlx::query(
            r#"INSERT INTO automation_triggers
               (id, trigger_type, entity_type, entity_id, location_id,
                stage_id, pipeline_id, calendar_id, data_json, created_at)
               SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE NOT EXISTS (
                   SELECT 1 FROM automation_triggers
                   WHERE trigger_type = ? AND entity_type = ? AND entity_id = ? AND created_at >= ?
               )"#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.trigger_type.as_str())
        .bind(&trigger.entity_type)
        .bind(&trigger.entity_id)
        .bind(&trigger.location_id)
        .bind(&trigger.stage_id)
        .bind(&trigger.pipeline_id)
        .bind(&trigger.calendar_id)
        .bind(&data_json)
        .bind(format_datetime(trigger.created_at))
        .bind(trigger.trigger_type.as_str())
        .bind(&trigger.entity_type)
        .bind(&trigger.entity_id)
        .bind(format_datetime(since))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record(&self, trigger: &Trigger) -> DomainResult<()> {
        let data_json = serde_json::to_string(&trigger.data)?;

        sqlx::query(
            r#"INSERT INTO automation_triggers
               (id, trigger_type, entity_type, entity_id, location_id,
                stage_id, pipeline_id, calendar_id, data_json, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(trigger.id.to_string())
        .bind(trigger.trigger_type.as_str())
        .bind(&trigger.entity_type)
        .bind(&trigger.entity_id)
        .bind(&trigger.location_id)
        .bind(&trigger.stage_id)
        .bind(&trigger.pipeline_id)
        .bind(&trigger.calendar_id)
        .bind(&data_json)
        .bind(format_datetime(trigger.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_recorded_at(
        &self,
        trigger_type: &TriggerType,
        entity_type: &str,
        entity_id: &str,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let (latest,): (Option<String>,) = sqlx::query_as(
            r#"SELECT MAX(created_at) FROM automation_triggers
               WHERE trigger_type = ? AND entity_type = ? AND entity_id = ?"#,
        )
        .bind(trigger_type.as_str())
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        parse_optional_datetime(latest)
    }
}
