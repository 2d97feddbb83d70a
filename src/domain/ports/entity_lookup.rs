//! Ports onto the CRM collections owned by the external CRUD handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AppointmentSummary, ContactSummary, ProjectSummary};

/// Tenant-scoped lookups used to enrich trigger data.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn contact(&self, location_id: &str, id: &str) -> DomainResult<Option<ContactSummary>>;

    async fn project(&self, location_id: &str, id: &str) -> DomainResult<Option<ProjectSummary>>;

    async fn appointment(&self, location_id: &str, id: &str)
        -> DomainResult<Option<AppointmentSummary>>;
}

/// Appointment queries and the per-rule reminder-sent markers.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    /// Non-cancelled appointments of a location starting in `[start, end)`
    /// that do not yet carry `rule_id`'s reminder marker.
    async fn due_for_reminder(
        &self,
        location_id: &str,
        calendar_id: Option<&str>,
        rule_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<AppointmentSummary>>;

    /// Set the marker if absent. Returns false if it was already set.
    async fn claim_reminder(
        &self,
        appointment_id: &str,
        rule_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Clear the marker so a later sweep can retry.
    async fn release_reminder(&self, appointment_id: &str, rule_id: Uuid) -> DomainResult<()>;
}
