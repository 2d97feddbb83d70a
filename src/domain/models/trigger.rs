//! Trigger domain model.
//!
//! A `DomainEvent` is what an external CRUD handler hands to the engine.
//! The normalizer turns it into a `Trigger`, which is what rules match on
//! and what is snapshotted into every queue entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Event class a trigger (or a rule's trigger definition) refers to.
///
/// Unknown strings are carried as `Custom` and matched by exact equality,
/// so tenants can wire rules to event types this crate does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    ProjectCreated,
    /// Generic pipeline stage change emitted by the pipeline handlers.
    StageChanged,
    StageEntered,
    EnterStage,
    RecurringSchedule,
    BeforeAppointment,
    AppointmentStatusChanged,
    InvoicePaid,
    QuoteSigned,
    ContactCreated,
    Custom(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ProjectCreated => "project-created",
            Self::StageChanged => "stage-changed",
            Self::StageEntered => "stage-entered",
            Self::EnterStage => "enter-stage",
            Self::RecurringSchedule => "recurring-schedule",
            Self::BeforeAppointment => "before-appointment",
            Self::AppointmentStatusChanged => "appointment-status-changed",
            Self::InvoicePaid => "invoice-paid",
            Self::QuoteSigned => "quote-signed",
            Self::ContactCreated => "contact-created",
            Self::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "project-created" => Self::ProjectCreated,
            "stage-changed" => Self::StageChanged,
            "stage-entered" => Self::StageEntered,
            "enter-stage" => Self::EnterStage,
            "recurring-schedule" => Self::RecurringSchedule,
            "before-appointment" => Self::BeforeAppointment,
            "appointment-status-changed" => Self::AppointmentStatusChanged,
            "invoice-paid" => Self::InvoicePaid,
            "quote-signed" => Self::QuoteSigned,
            "contact-created" => Self::ContactCreated,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Rule-side aliases that listen for the generic stage-change event.
    pub fn is_stage_alias(&self) -> bool {
        matches!(self, Self::StageEntered | Self::EnterStage)
    }
}

impl From<String> for TriggerType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TriggerType> for String {
    fn from(t: TriggerType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw event reported by a domain handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl DomainEvent {
    pub fn new(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            location_id: location_id.into(),
            data: Value::Object(Map::new()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_stage(mut self, pipeline_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self.stage_id = Some(stage_id.into());
        self
    }

    /// Reject events that cannot be attributed to a tenant and an entity.
    pub fn validate(&self) -> DomainResult<()> {
        let missing: Vec<&str> = [
            ("type", self.event_type.as_str()),
            ("entityId", self.entity_id.as_str()),
            ("locationId", self.location_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidTrigger(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

/// Canonical, enriched representation of a domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub entity_type: String,
    pub entity_id: String,
    pub location_id: String,
    pub stage_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub calendar_id: Option<String>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(
        trigger_type: TriggerType,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_type,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            location_id: location_id.into(),
            stage_id: None,
            pipeline_id: None,
            calendar_id: None,
            data: Value::Object(Map::new()),
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_calendar(mut self, calendar_id: Option<String>) -> Self {
        self.calendar_id = calendar_id;
        self
    }

    /// Contact the trigger is about: `data.contactId`, falling back to `data.contact.id`.
    pub fn contact_id(&self) -> Option<&str> {
        self.data
            .get("contactId")
            .and_then(Value::as_str)
            .or_else(|| {
                self.data
                    .get("contact")
                    .and_then(|c| c.get("id"))
                    .and_then(Value::as_str)
            })
    }

    /// The payload snapshotted into queue entries.
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            trigger_type: self.trigger_type.clone(),
            location_id: self.location_id.clone(),
            data: self.data.clone(),
        }
    }
}

/// Trigger payload stored on a queue entry and handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSnapshot {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub location_id: String,
    pub data: Value,
}
