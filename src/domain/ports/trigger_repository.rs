//! Repository port for ingested triggers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Trigger, TriggerType};

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Persist `trigger` unless one with the same `(type, entity_type,
    /// entity_id)` was created at or after `since`.
    ///
    /// The check and the insert are a single statement, so two concurrent
    /// deliveries cannot both be recorded. Returns whether it was recorded.
    async fn record_unless_recent(&self, trigger: &Trigger, since: DateTime<Utc>) -> DomainResult<bool>;

    /// Persist unconditionally.
    async fn record(&self, trigger: &Trigger) -> DomainResult<()>;

    /// Creation time of the newest trigger for an entity.
    async fn last_recorded_at(
        &self,
        trigger_type: &TriggerType,
        entity_type: &str,
        entity_id: &str,
    ) -> DomainResult<Option<DateTime<Utc>>>;
}
