//! SQLite implementation of the RuleRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AutomationRule, ExecutionStats, RuleTrigger, TriggerType};
use crate::domain::ports::RuleRepository;

#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn bump_stats(&self, rule_id: Uuid, at: DateTime<Utc>, success: bool) -> DomainResult<()> {
        let (success_inc, failure_inc) = if success { (1i64, 0i64) } else { (0, 1) };

        let result = sqlx::query(
            r#"UPDATE automation_rules SET
               execution_count = execution_count + 1,
               success_count = success_count + ?,
               failure_count = failure_count + ?,
               last_executed = ?
               WHERE id = ?"#,
        )
        .bind(success_inc)
        .bind(failure_inc)
        .bind(format_datetime(at))
        .bind(rule_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::RuleNotFound(rule_id));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    location_id: String,
    name: String,
    description: String,
    is_active: i64,
    priority: i64,
    #[allow(dead_code)]
    trigger_type: String,
    trigger_json: String,
    conditions_json: Option<String>,
    actions_json: Option<String>,
    execution_count: i64,
    success_count: i64,
    failure_count: i64,
    last_executed: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RuleRow> for AutomationRule {
    type Error = DomainError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let trigger: RuleTrigger = serde_json::from_str(&row.trigger_json)?;

        Ok(AutomationRule {
            id: parse_uuid(&row.id)?,
            location_id: row.location_id,
            name: row.name,
            description: row.description,
            is_active: row.is_active != 0,
            priority: i32::try_from(row.priority).unwrap_or(0),
            trigger,
            conditions: parse_json_or_default(row.conditions_json)?,
            actions: parse_json_or_default(row.actions_json)?,
            execution_stats: ExecutionStats {
                execution_count: row.execution_count.max(0) as u64,
                success_count: row.success_count.max(0) as u64,
                failure_count: row.failure_count.max(0) as u64,
                last_executed: parse_optional_datetime(row.last_executed)?,
            },
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    async fn upsert(&self, rule: &AutomationRule) -> DomainResult<()> {
        let trigger_json = serde_json::to_string(&rule.trigger)?;
        let conditions_json = serde_json::to_string(&rule.conditions)?;
        let actions_json = serde_json::to_string(&rule.actions)?;

        // Statistics belong to the worker; a re-import never resets them.
        sqlx::query(
            r#"INSERT INTO automation_rules
               (id, location_id, name, description, is_active, priority, trigger_type,
                trigger_json, conditions_json, actions_json, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                location_id = excluded.location_id,
                name = excluded.name,
                description = excluded.description,
                is_active = excluded.is_active,
                priority = excluded.priority,
                trigger_type = excluded.trigger_type,
                trigger_json = excluded.trigger_json,
                conditions_json = excluded.conditions_json,
                actions_json = excluded.actions_json,
                updated_at = excluded.updated_at"#,
        )
        .bind(rule.id.to_string())
        .bind(&rule.location_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(i64::from(rule.is_active))
        .bind(i64::from(rule.priority))
        .bind(rule.trigger.trigger_type.as_str())
        .bind(&trigger_json)
        .bind(&conditions_json)
        .bind(&actions_json)
        .bind(format_datetime(rule.created_at))
        .bind(format_datetime(rule.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        let row: Option<RuleRow> = sqlx::query_as("SELECT * FROM automation_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(AutomationRule::try_from).transpose()
    }

    async fn list(&self, location_id: Option<&str>) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = match location_id {
            Some(location_id) => {
                sqlx::query_as(
                    "SELECT * FROM automation_rules WHERE location_id = ? ORDER BY priority DESC, name",
                )
                .bind(location_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM automation_rules ORDER BY location_id, priority DESC, name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(AutomationRule::try_from).collect()
    }

    async fn list_active_for_location(&self, location_id: &str) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rules
               WHERE location_id = ? AND is_active = 1
               ORDER BY priority DESC, created_at ASC"#,
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AutomationRule::try_from).collect()
    }

    async fn list_active_by_trigger_type(
        &self,
        trigger_type: &TriggerType,
    ) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT * FROM automation_rules
               WHERE trigger_type = ? AND is_active = 1
               ORDER BY location_id, priority DESC, created_at ASC"#,
        )
        .bind(trigger_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AutomationRule::try_from).collect()
    }

    async fn record_success(&self, rule_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        self.bump_stats(rule_id, at, true).await
    }

    async fn record_failure(&self, rule_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        self.bump_stats(rule_id, at, false).await
    }
}
