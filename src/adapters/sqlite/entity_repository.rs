//! SQLite adapter over the CRM collections: enrichment lookups and the
//! appointment reminder markers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AppointmentSummary, ContactSummary, ProjectSummary};
use crate::domain::ports::{EntityLookup, ReminderSource};

#[derive(Clone)]
pub struct SqliteEntityRepository {
    pool: SqlitePool,
}

impl SqliteEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write a contact row. The CRUD handlers own these tables; this is for
    /// seeding and tests.
    pub async fn upsert_contact(&self, location_id: &str, contact: &ContactSummary) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO contacts (id, location_id, name, phone, email) VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET location_id = excluded.location_id,
                name = excluded.name, phone = excluded.phone, email = excluded.email"#,
        )
        .bind(&contact.id)
        .bind(location_id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_project(&self, location_id: &str, project: &ProjectSummary) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO projects (id, location_id, name, value, contact_id, pipeline_id, stage_id)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET location_id = excluded.location_id,
                name = excluded.name, value = excluded.value, contact_id = excluded.contact_id,
                pipeline_id = excluded.pipeline_id, stage_id = excluded.stage_id"#,
        )
        .bind(&project.id)
        .bind(location_id)
        .bind(&project.name)
        .bind(project.value)
        .bind(&project.contact_id)
        .bind(&project.pipeline_id)
        .bind(&project.stage_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_appointment(&self, appointment: &AppointmentSummary) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO appointments (id, location_id, calendar_id, contact_id, title, status, start_time)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET location_id = excluded.location_id,
                calendar_id = excluded.calendar_id, contact_id = excluded.contact_id,
                title = excluded.title, status = excluded.status, start_time = excluded.start_time"#,
        )
        .bind(&appointment.id)
        .bind(&appointment.location_id)
        .bind(&appointment.calendar_id)
        .bind(&appointment.contact_id)
        .bind(&appointment.title)
        .bind(&appointment.status)
        .bind(format_datetime(appointment.start_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: String,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

impl From<ContactRow> for ContactSummary {
    fn from(row: ContactRow) -> Self {
        Self { id: row.id, name: row.name, phone: row.phone, email: row.email }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    name: Option<String>,
    value: Option<f64>,
    contact_id: Option<String>,
    pipeline_id: Option<String>,
    stage_id: Option<String>,
}

impl From<ProjectRow> for ProjectSummary {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            value: row.value,
            contact_id: row.contact_id,
            pipeline_id: row.pipeline_id,
            stage_id: row.stage_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    id: String,
    location_id: String,
    calendar_id: Option<String>,
    contact_id: Option<String>,
    title: Option<String>,
    status: String,
    start_time: String,
}

impl TryFrom<AppointmentRow> for AppointmentSummary {
    type Error = DomainError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            location_id: row.location_id,
            calendar_id: row.calendar_id,
            contact_id: row.contact_id,
            title: row.title,
            status: row.status,
            start_time: parse_datetime(&row.start_time)?,
        })
    }
}

const APPOINTMENT_COLUMNS: &str =
    "id, location_id, calendar_id, contact_id, title, status, start_time";

/// JSON path addressing one rule's marker; rule ids contain `-`, so the key is quoted.
const MARKER_PATH: &str = r#"'$."' || ? || '"'"#;

#[async_trait]
impl EntityLookup for SqliteEntityRepository {
    async fn contact(&self, location_id: &str, id: &str) -> DomainResult<Option<ContactSummary>> {
        let row: Option<ContactRow> = sqlx::query_as(
            "SELECT id, name, phone, email FROM contacts WHERE id = ? AND location_id = ?",
        )
        .bind(id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ContactSummary::from))
    }

    async fn project(&self, location_id: &str, id: &str) -> DomainResult<Option<ProjectSummary>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"SELECT id, name, value, contact_id, pipeline_id, stage_id
               FROM projects WHERE id = ? AND location_id = ?"#,
        )
        .bind(id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProjectSummary::from))
    }

    async fn appointment(
        &self,
        location_id: &str,
        id: &str,
    ) -> DomainResult<Option<AppointmentSummary>> {
        let query =
            format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ? AND location_id = ?");
        let row: Option<AppointmentRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AppointmentSummary::try_from).transpose()
    }
}

#[async_trait]
impl ReminderSource for SqliteEntityRepository {
    async fn due_for_reminder(
        &self,
        location_id: &str,
        calendar_id: Option<&str>,
        rule_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<AppointmentSummary>> {
        let query = format!(
            r#"SELECT {APPOINTMENT_COLUMNS} FROM appointments
               WHERE location_id = ?
                 AND (? IS NULL OR calendar_id = ?)
                 AND status NOT IN ('cancelled', 'canceled')
                 AND start_time >= ? AND start_time < ?
                 AND json_extract(reminders_sent, {MARKER_PATH}) IS NULL
               ORDER BY start_time"#
        );
        let rows: Vec<AppointmentRow> = sqlx::query_as(&query)
            .bind(location_id)
            .bind(calendar_id)
            .bind(calendar_id)
            .bind(format_datetime(start))
            .bind(format_datetime(end))
            .bind(rule_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AppointmentSummary::try_from).collect()
    }

    async fn claim_reminder(
        &self,
        appointment_id: &str,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let query = format!(
            r#"UPDATE appointments
               SET reminders_sent = json_set(reminders_sent, {MARKER_PATH}, ?)
               WHERE id = ? AND json_extract(reminders_sent, {MARKER_PATH}) IS NULL"#
        );
        let result = sqlx::query(&query)
            .bind(rule_id.to_string())
            .bind(format_datetime(now))
            .bind(appointment_id)
            .bind(rule_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_reminder(&self, appointment_id: &str, rule_id: Uuid) -> DomainResult<()> {
        let query = format!(
            "UPDATE appointments SET reminders_sent = json_remove(reminders_sent, {MARKER_PATH}) WHERE id = ?"
        );
        sqlx::query(&query)
            .bind(rule_id.to_string())
            .bind(appointment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::{Duration, TimeZone};

    async fn setup() -> SqliteEntityRepository {
        SqliteEntityRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn appointment(id: &str, start: DateTime<Utc>, status: &str) -> AppointmentSummary {
        AppointmentSummary {
            id: id.into(),
            location_id: "loc-1".into(),
            calendar_id: Some("cal-1".into()),
            contact_id: Some("C1".into()),
            title: Some("Roof inspection".into()),
            status: status.into(),
            start_time: start,
        }
    }

    #[tokio::test]
    async fn test_lookups_are_tenant_scoped() {
        let repo = setup().await;
        let contact = ContactSummary {
            id: "C1".into(),
            name: Some("Dana".into()),
            phone: Some("+15550100".into()),
            email: None,
        };
        repo.upsert_contact("loc-1", &contact).await.unwrap();

        assert_eq!(repo.contact("loc-1", "C1").await.unwrap(), Some(contact));
        assert!(repo.contact("loc-2", "C1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_for_reminder_window_and_filters() {
        let repo = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap();
        let end = start + Duration::minutes(5);
        repo.upsert_appointment(&appointment("A1", start + Duration::minutes(2), "scheduled"))
            .await
            .unwrap();
        repo.upsert_appointment(&appointment("A2", start + Duration::minutes(3), "cancelled"))
            .await
            .unwrap();
        repo.upsert_appointment(&appointment("A3", end, "scheduled")).await.unwrap();

        let rule_id = Uuid::new_v4();
        let due = repo.due_for_reminder("loc-1", None, rule_id, start, end).await.unwrap();
        assert_eq!(due.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["A1"]);

        let other_calendar = repo
            .due_for_reminder("loc-1", Some("cal-2"), rule_id, start, end)
            .await
            .unwrap();
        assert!(other_calendar.is_empty());
    }

    #[tokio::test]
    async fn test_reminder_marker_claim_is_once_per_rule() {
        let repo = setup().await;
        let start = Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap();
        repo.upsert_appointment(&appointment("A1", start, "scheduled")).await.unwrap();

        let rule_a = Uuid::new_v4();
        let rule_b = Uuid::new_v4();
        let now = Utc::now();
        assert!(repo.claim_reminder("A1", rule_a, now).await.unwrap());
        assert!(!repo.claim_reminder("A1", rule_a, now).await.unwrap());
        assert!(repo.claim_reminder("A1", rule_b, now).await.unwrap());

        let end = start + Duration::minutes(5);
        assert!(repo.due_for_reminder("loc-1", None, rule_a, start, end).await.unwrap().is_empty());

        repo.release_reminder("A1", rule_a).await.unwrap();
        assert_eq!(repo.due_for_reminder("loc-1", None, rule_a, start, end).await.unwrap().len(), 1);
        assert!(repo.due_for_reminder("loc-1", None, rule_b, start, end).await.unwrap().is_empty());
    }
}
