//! Repository port for automation rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AutomationRule, TriggerType};

/// Read access to tenant rules plus the worker-owned execution statistics.
///
/// Rule definitions are authored elsewhere; `upsert` exists for seeding and
/// operator imports.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert or replace a rule definition, preserving stored statistics.
    async fn upsert(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Get a rule by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>>;

    /// List rules, optionally scoped to one location.
    async fn list(&self, location_id: Option<&str>) -> DomainResult<Vec<AutomationRule>>;

    /// Active rules of a location, highest priority first.
    async fn list_active_for_location(&self, location_id: &str) -> DomainResult<Vec<AutomationRule>>;

    /// Active rules of every location with the given trigger type.
    async fn list_active_by_trigger_type(
        &self,
        trigger_type: &TriggerType,
    ) -> DomainResult<Vec<AutomationRule>>;

    /// Count one successful terminal execution.
    async fn record_success(&self, rule_id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    /// Count one failed terminal execution.
    async fn record_failure(&self, rule_id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;
}
