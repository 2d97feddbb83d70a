//! Turns raw domain events into canonical, enriched triggers.
//!
//! Enrichment only ever copies the bounded projections defined on the
//! entity summaries; raw documents never reach trigger data.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DomainEvent, Trigger, TriggerType};
use crate::domain::ports::{EntityLookup, TriggerRepository};

pub struct TriggerNormalizer {
    triggers: Arc<dyn TriggerRepository>,
    entities: Arc<dyn EntityLookup>,
    suppression_window: Duration,
}

impl TriggerNormalizer {
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        entities: Arc<dyn EntityLookup>,
        suppression_window: Duration,
    ) -> Self {
        Self { triggers, entities, suppression_window }
    }

    /// Validate, enrich and persist an event. `Ok(None)` means it repeated a
    /// trigger for the same entity inside the suppression window.
    pub async fn ingest(&self, event: DomainEvent) -> DomainResult<Option<Trigger>> {
        self.ingest_at(event, Utc::now()).await
    }

    pub async fn ingest_at(&self, event: DomainEvent, now: DateTime<Utc>) -> DomainResult<Option<Trigger>> {
        if let Err(e) = event.validate() {
            warn!(
                event_type = %event.event_type,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                location_id = %event.location_id,
                error = %e,
                "Rejected malformed domain event"
            );
            return Err(e);
        }

        let mut trigger = Self::canonicalize(event, now)?;
        self.enrich(&mut trigger).await?;

        let since = now - self.suppression_window;
        if !self.triggers.record_unless_recent(&trigger, since).await? {
            debug!(
                trigger_type = %trigger.trigger_type,
                entity_id = %trigger.entity_id,
                "Suppressed repeated trigger"
            );
            return Ok(None);
        }

        debug!(trigger_id = %trigger.id, trigger_type = %trigger.trigger_type, "Trigger recorded");
        Ok(Some(trigger))
    }

    fn canonicalize(event: DomainEvent, now: DateTime<Utc>) -> DomainResult<Trigger> {
        let data = match event.data {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            _ => {
                return Err(DomainError::InvalidTrigger("data must be a JSON object".to_string()));
            }
        };

        let entity_type = if event.entity_type.trim().is_empty() {
            "unknown".to_string()
        } else {
            event.entity_type.trim().to_lowercase()
        };

        let mut trigger = Trigger::new(
            TriggerType::parse(&event.event_type),
            entity_type,
            event.entity_id.trim(),
            event.location_id.trim(),
        )
        .with_data(data)
        .with_calendar(event.calendar_id);
        trigger.stage_id = event.stage_id;
        trigger.pipeline_id = event.pipeline_id;
        trigger.created_at = now;
        Ok(trigger)
    }

    async fn enrich(&self, trigger: &mut Trigger) -> DomainResult<()> {
        let location_id = trigger.location_id.clone();

        let project_id = referenced_id(trigger, "project", "projectId");
        if let Some(project_id) = project_id {
            if let Some(project) = self.entities.project(&location_id, &project_id).await? {
                if trigger.contact_id().is_none() {
                    if let Some(contact_id) = &project.contact_id {
                        set_field(trigger, "contactId", Value::String(contact_id.clone()));
                    }
                }
                if trigger.pipeline_id.is_none() {
                    trigger.pipeline_id.clone_from(&project.pipeline_id);
                }
                set_field(trigger, "project", project.projection());
            }
        }

        if trigger.entity_type == "appointment" {
            let appointment_id = trigger.entity_id.clone();
            if let Some(appointment) = self.entities.appointment(&location_id, &appointment_id).await? {
                if trigger.contact_id().is_none() {
                    if let Some(contact_id) = &appointment.contact_id {
                        set_field(trigger, "contactId", Value::String(contact_id.clone()));
                    }
                }
                if trigger.calendar_id.is_none() {
                    trigger.calendar_id.clone_from(&appointment.calendar_id);
                }
                set_field(trigger, "appointment", appointment.projection());
            }
        }

        let contact_id = referenced_id(trigger, "contact", "contactId");
        if let Some(contact_id) = contact_id {
            if let Some(contact) = self.entities.contact(&location_id, &contact_id).await? {
                set_field(trigger, "contactId", Value::String(contact.id.clone()));
                set_field(trigger, "contact", contact.projection());
            }
        }

        Ok(())
    }
}

/// Id of a related entity: the trigger's own entity when the type matches,
/// otherwise the given key in trigger data.
fn referenced_id(trigger: &Trigger, entity_type: &str, data_key: &str) -> Option<String> {
    if trigger.entity_type == entity_type {
        return Some(trigger.entity_id.clone());
    }
    match data_key {
        "contactId" => trigger.contact_id().map(str::to_string),
        _ => trigger
            .data
            .get(data_key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

fn set_field(trigger: &mut Trigger, key: &str, value: Value) {
    if let Value::Object(map) = &mut trigger.data {
        map.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteEntityRepository, SqliteTriggerRepository};
    use crate::domain::models::{ContactSummary, ProjectSummary};
    use serde_json::json;

    async fn setup() -> (TriggerNormalizer, SqliteEntityRepository) {
        let pool = create_migrated_test_pool().await.unwrap();
        let entities = SqliteEntityRepository::new(pool.clone());
        let normalizer = TriggerNormalizer::new(
            Arc::new(SqliteTriggerRepository::new(pool)),
            Arc::new(entities.clone()),
            Duration::seconds(5),
        );
        (normalizer, entities)
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let (normalizer, _) = setup().await;
        let err = normalizer
            .ingest(DomainEvent::new("project-created", "project", "", "loc-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTrigger(_)));
    }

    #[tokio::test]
    async fn test_non_object_data_rejected() {
        let (normalizer, _) = setup().await;
        let event = DomainEvent::new("project-created", "project", "P1", "loc-1").with_data(json!([1, 2]));
        assert!(normalizer.ingest(event).await.unwrap_err().is_input_error());
    }

    #[tokio::test]
    async fn test_project_enrichment_derives_contact() {
        let (normalizer, entities) = setup().await;
        entities
            .upsert_contact(
                "loc-1",
                &ContactSummary {
                    id: "C1".into(),
                    name: Some("Dana".into()),
                    phone: Some("+15550100".into()),
                    email: None,
                },
            )
            .await
            .unwrap();
        entities
            .upsert_project(
                "loc-1",
                &ProjectSummary {
                    id: "P1".into(),
                    name: Some("Roof".into()),
                    value: Some(12_000.0),
                    contact_id: Some("C1".into()),
                    pipeline_id: Some("pipe-1".into()),
                    stage_id: Some("s1".into()),
                },
            )
            .await
            .unwrap();

        let trigger = normalizer
            .ingest(DomainEvent::new("project-created", "project", "P1", "loc-1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(trigger.trigger_type, TriggerType::ProjectCreated);
        assert_eq!(trigger.contact_id(), Some("C1"));
        assert_eq!(trigger.data["project"]["value"], json!(12_000.0));
        assert_eq!(trigger.data["contact"]["phone"], "+15550100");
        assert_eq!(trigger.pipeline_id.as_deref(), Some("pipe-1"));
    }

    #[tokio::test]
    async fn test_lookup_is_tenant_scoped() {
        let (normalizer, entities) = setup().await;
        entities
            .upsert_contact(
                "loc-2",
                &ContactSummary { id: "C1".into(), name: None, phone: None, email: None },
            )
            .await
            .unwrap();

        let trigger = normalizer
            .ingest(
                DomainEvent::new("contact-created", "contact", "C1", "loc-1")
                    .with_data(json!({"source": "web"})),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(trigger.data.get("contact").is_none());
        assert_eq!(trigger.data["source"], "web");
    }

    #[tokio::test]
    async fn test_repeat_within_window_is_suppressed() {
        let (normalizer, _) = setup().await;
        let now = Utc::now();
        let event = DomainEvent::new("project-created", "project", "P1", "loc-1");

        assert!(normalizer.ingest_at(event.clone(), now).await.unwrap().is_some());
        assert!(normalizer
            .ingest_at(event.clone(), now + Duration::seconds(2))
            .await
            .unwrap()
            .is_none());
        assert!(normalizer
            .ingest_at(event, now + Duration::seconds(8))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_stage_fields_carried_over() {
        let (normalizer, _) = setup().await;
        let trigger = normalizer
            .ingest(DomainEvent::new("stage-changed", "project", "P9", "loc-1").with_stage("pipe-1", "s2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trigger.trigger_type, TriggerType::StageChanged);
        assert_eq!(trigger.stage_id.as_deref(), Some("s2"));
        assert_eq!(trigger.pipeline_id.as_deref(), Some("pipe-1"));
    }
}
