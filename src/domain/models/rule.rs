//! Automation rule domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::action::RuleAction;
use super::condition::{all_conditions_pass, Condition};
use super::trigger::{Trigger, TriggerType};
use crate::domain::errors::{DomainError, DomainResult};

/// Trigger definition of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    /// Type-specific settings (recurring cadence, reminder lead time).
    #[serde(default)]
    pub config: Value,
}

impl RuleTrigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            stage_id: None,
            pipeline_id: None,
            calendar_id: None,
            config: Value::Object(Map::new()),
        }
    }

    pub fn stage(pipeline_id: Option<String>, stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: Some(stage_id.into()),
            pipeline_id,
            ..Self::new(TriggerType::StageEntered)
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// Whether this definition listens for the given trigger.
    ///
    /// Exact type equality matches. A generic stage change also matches a
    /// stage alias when the stage agrees and, where the rule pins them,
    /// the pipeline and calendar agree too.
    pub fn matches(&self, trigger: &Trigger) -> bool {
        if self.trigger_type == trigger.trigger_type {
            return true;
        }

        if trigger.trigger_type != TriggerType::StageChanged || !self.trigger_type.is_stage_alias() {
            return false;
        }

        let pinned_equal = |rule_value: &Option<String>, trigger_value: &Option<String>| {
            rule_value.is_none() || rule_value == trigger_value
        };

        self.stage_id.is_some()
            && self.stage_id == trigger.stage_id
            && pinned_equal(&self.pipeline_id, &trigger.pipeline_id)
            && pinned_equal(&self.calendar_id, &trigger.calendar_id)
    }
}

/// Per-rule execution counters, written only by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_executed: Option<DateTime<Utc>>,
}

/// A tenant-configured automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub location_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Higher values are evaluated first.
    #[serde(default)]
    pub priority: i32,
    pub trigger: RuleTrigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub execution_stats: ExecutionStats,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl AutomationRule {
    pub fn new(location_id: impl Into<String>, name: impl Into<String>, trigger: RuleTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            location_id: location_id.into(),
            name: name.into(),
            description: String::new(),
            is_active: true,
            priority: 0,
            trigger,
            conditions: Vec::new(),
            actions: Vec::new(),
            execution_stats: ExecutionStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Reject definitions that could never produce work: a blank tenant or
    /// name, or an action whose type or config does not parse.
    pub fn validate(&self) -> DomainResult<()> {
        if self.location_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(format!("rule '{}' has no locationId", self.name)));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(format!("rule {} has no name", self.id)));
        }
        for action in &self.actions {
            action.parse()?;
        }
        Ok(())
    }

    /// Full candidate check: active, same tenant, trigger matches, conditions pass.
    pub fn applies_to(&self, trigger: &Trigger) -> bool {
        self.is_active
            && self.location_id == trigger.location_id
            && self.trigger.matches(trigger)
            && all_conditions_pass(&self.conditions, &trigger.data)
    }
}
