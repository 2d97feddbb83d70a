//! Read-only projections of the CRM entities the engine enriches triggers with.
//!
//! These are deliberately narrow: only fields an action template may
//! reference are ever copied into trigger data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ContactSummary {
    pub fn projection(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "phone": self.phone,
            "email": self.email,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: Option<String>,
    pub value: Option<f64>,
    pub contact_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub stage_id: Option<String>,
}

impl ProjectSummary {
    pub fn projection(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "value": self.value,
            "pipelineId": self.pipeline_id,
            "stageId": self.stage_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    pub id: String,
    pub location_id: String,
    pub calendar_id: Option<String>,
    pub contact_id: Option<String>,
    pub title: Option<String>,
    pub status: String,
    pub start_time: DateTime<Utc>,
}

impl AppointmentSummary {
    pub fn projection(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "status": self.status,
            "startTime": self.start_time.to_rfc3339(),
            "calendarId": self.calendar_id,
        })
    }
}
