//! SQLite implementation of the QueueRepository.
//!
//! The dedup slot for an action hash is the `dedupe_key` column under a
//! partial unique index. An entry holds it from insert until it reaches a
//! terminal state, or until a newer identical action arrives after the
//! holder has aged out of the dedup window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::adapters::sqlite::{
    format_datetime, format_optional_datetime, parse_datetime, parse_optional_datetime, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActionKind, EnqueueOutcome, FailureOutcome, QueueEntry, QueueMetadata, QueueStatus,
};
use crate::domain::ports::{QueueFilter, QueueRepository};

#[derive(Clone)]
pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `processing -> pending|failed` with the attempt counted. `terminal`
    /// fails the entry regardless of attempts left.
    async fn finalize_failure(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
        terminal: bool,
    ) -> DomainResult<FailureOutcome> {
        // Right-hand sides see the pre-update row, so `attempts + 1` is the new count.
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"UPDATE automation_queue SET
               attempts = attempts + 1,
               last_error = ?1,
               updated_at = ?2,
               status = CASE WHEN ?3 OR attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
               failed_at = CASE WHEN ?3 OR attempts + 1 >= max_attempts THEN ?2 ELSE failed_at END,
               dedupe_key = CASE WHEN ?3 OR attempts + 1 >= max_attempts THEN NULL ELSE dedupe_key END
               WHERE id = ?4 AND status = 'processing'
               RETURNING status, attempts"#,
        )
        .bind(error)
        .bind(format_datetime(now))
        .bind(terminal)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some((status, attempts)) = row else {
            return Err(self.transition_error(id, QueueStatus::Failed).await);
        };

        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        if status == QueueStatus::Failed.as_str() {
            Ok(FailureOutcome::Failed { attempts })
        } else {
            Ok(FailureOutcome::Retrying { attempts })
        }
    }

    /// Distinguish a missing entry from one in the wrong state.
    async fn transition_error(&self, id: Uuid, to: QueueStatus) -> DomainError {
        match self.get(id).await {
            Ok(Some(entry)) => DomainError::InvalidStateTransition {
                from: entry.status.to_string(),
                to: to.to_string(),
                reason: "entry is not processing".to_string(),
            },
            Ok(None) => DomainError::QueueEntryNotFound(id),
            Err(e) => e,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    rule_id: String,
    #[allow(dead_code)]
    location_id: String,
    entity_id: String,
    action_type: String,
    action_json: String,
    trigger_json: String,
    status: String,
    scheduled_for: Option<String>,
    attempts: i64,
    max_attempts: i64,
    trigger_hash: String,
    action_hash: String,
    #[allow(dead_code)]
    dedupe_key: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
    failed_at: Option<String>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = DomainError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let action_type = ActionKind::from_str(&row.action_type).ok_or_else(|| {
            DomainError::SerializationError(format!("Unknown action type column: {}", row.action_type))
        })?;
        let status = QueueStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        Ok(QueueEntry {
            id: parse_uuid(&row.id)?,
            rule_id: parse_uuid(&row.rule_id)?,
            action_type,
            action: serde_json::from_str(&row.action_json)?,
            trigger: serde_json::from_str(&row.trigger_json)?,
            entity_id: row.entity_id,
            status,
            scheduled_for: parse_optional_datetime(row.scheduled_for)?,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(1),
            metadata: QueueMetadata {
                trigger_hash: row.trigger_hash,
                action_hash: row.action_hash,
            },
            last_error: row.last_error,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            claimed_at: parse_optional_datetime(row.claimed_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            failed_at: parse_optional_datetime(row.failed_at)?,
        })
    }
}

const NON_TERMINAL_SQL: &str = "status IN ('pending', 'scheduled', 'processing')";

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn find_active_duplicate(
        &self,
        action_hash: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<QueueEntry>> {
        let query = format!(
            "SELECT * FROM automation_queue WHERE action_hash = ? AND {NON_TERMINAL_SQL} \
             AND created_at >= ? ORDER BY created_at DESC LIMIT 1"
        );
        let row: Option<QueueRow> = sqlx::query_as(&query)
            .bind(action_hash)
            .bind(format_datetime(since))
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn enqueue(
        &self,
        entry: &QueueEntry,
        window_start: DateTime<Utc>,
    ) -> DomainResult<EnqueueOutcome> {
        let action_json = serde_json::to_string(&entry.action)?;
        let trigger_json = serde_json::to_string(&entry.trigger)?;
        let action_hash = &entry.metadata.action_hash;

        let mut tx = self.pool.begin().await?;

        // A holder older than the window no longer blocks an identical action.
        sqlx::query(
            "UPDATE automation_queue SET dedupe_key = NULL WHERE dedupe_key = ? AND created_at < ?",
        )
        .bind(action_hash)
        .bind(format_datetime(window_start))
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"INSERT INTO automation_queue
               (id, rule_id, location_id, entity_id, action_type, action_json, trigger_json,
                status, scheduled_for, attempts, max_attempts, trigger_hash, action_hash,
                dedupe_key, last_error, created_at, updated_at, claimed_at, completed_at, failed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.rule_id.to_string())
        .bind(&entry.trigger.location_id)
        .bind(&entry.entity_id)
        .bind(entry.action_type.as_str())
        .bind(&action_json)
        .bind(&trigger_json)
        .bind(entry.status.as_str())
        .bind(format_optional_datetime(entry.scheduled_for))
        .bind(i64::from(entry.attempts))
        .bind(i64::from(entry.max_attempts))
        .bind(&entry.metadata.trigger_hash)
        .bind(action_hash)
        .bind(action_hash)
        .bind(&entry.last_error)
        .bind(format_datetime(entry.created_at))
        .bind(format_datetime(entry.updated_at))
        .bind(format_optional_datetime(entry.claimed_at))
        .bind(format_optional_datetime(entry.completed_at))
        .bind(format_optional_datetime(entry.failed_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(EnqueueOutcome::Inserted(entry.clone()))
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await?;
                Ok(EnqueueOutcome::Duplicate { action_hash: action_hash.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<QueueEntry>> {
        let row: Option<QueueRow> = sqlx::query_as("SELECT * FROM automation_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn list(&self, filter: QueueFilter) -> DomainResult<Vec<QueueEntry>> {
        let mut query = String::from("SELECT * FROM automation_queue WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(rule_id) = &filter.rule_id {
            query.push_str(" AND rule_id = ?");
            bindings.push(rule_id.to_string());
        }
        if let Some(location_id) = &filter.location_id {
            query.push_str(" AND location_id = ?");
            bindings.push(location_id.clone());
        }

        query.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut q = sqlx::query_as::<_, QueueRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<QueueRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<QueueStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM automation_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = QueueStatus::from_str(&status) {
                counts.insert(status, u64::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"UPDATE automation_queue
               SET status = 'pending', scheduled_for = NULL, updated_at = ?
               WHERE status = 'scheduled' AND scheduled_for <= ? AND attempts < max_attempts"#,
        )
        .bind(format_datetime(now))
        .bind(format_datetime(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn claimable_ids(&self, limit: i64) -> DomainResult<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM automation_queue WHERE status = 'pending'
               ORDER BY COALESCE(scheduled_for, created_at), created_at
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|(id,)| parse_uuid(id)).collect()
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Option<QueueEntry>> {
        let row: Option<QueueRow> = sqlx::query_as(
            r#"UPDATE automation_queue
               SET status = 'processing', claimed_at = ?, updated_at = ?
               WHERE id = ? AND status = 'pending'
               RETURNING *"#,
        )
        .bind(format_datetime(now))
        .bind(format_datetime(now))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE automation_queue
               SET status = 'completed', completed_at = ?, updated_at = ?, dedupe_key = NULL
               WHERE id = ? AND status = 'processing'"#,
        )
        .bind(format_datetime(now))
        .bind(format_datetime(now))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_attempt(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome> {
        self.finalize_failure(id, error, now, false).await
    }

    async fn fail_permanently(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome> {
        self.finalize_failure(id, error, now, true).await
    }
}
