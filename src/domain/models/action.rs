//! Rule actions.
//!
//! Rules store actions loosely (`RuleAction`: a type string, a JSON config
//! and an optional delay) because they are written by an external admin API.
//! At expansion time each one is parsed into the typed `Action` sum type;
//! that typed value is what gets snapshotted into the queue.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::{DomainError, DomainResult};

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

/// Unit of an action delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
    /// Anything else contributes no delay.
    Unknown,
}

impl DelayUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for DelayUnit {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "minutes" | "minute" => Self::Minutes,
            "hours" | "hour" => Self::Hours,
            "days" | "day" => Self::Days,
            _ => Self::Unknown,
        }
    }
}

impl From<DelayUnit> for String {
    fn from(unit: DelayUnit) -> Self {
        unit.as_str().to_string()
    }
}

/// How long to wait before an action becomes eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delay {
    pub amount: u32,
    pub unit: DelayUnit,
}

impl Delay {
    pub fn minutes(amount: u32) -> Self {
        Self { amount, unit: DelayUnit::Minutes }
    }

    pub fn hours(amount: u32) -> Self {
        Self { amount, unit: DelayUnit::Hours }
    }

    pub fn days(amount: u32) -> Self {
        Self { amount, unit: DelayUnit::Days }
    }

    pub fn as_millis(&self) -> i64 {
        let per_unit = match self.unit {
            DelayUnit::Minutes => MINUTE_MS,
            DelayUnit::Hours => HOUR_MS,
            DelayUnit::Days => DAY_MS,
            DelayUnit::Unknown => 0,
        };
        i64::from(self.amount) * per_unit
    }
}

/// Delay in milliseconds for an optional delay; absent means run now.
pub fn delay_millis(delay: Option<&Delay>) -> i64 {
    delay.map_or(0, Delay::as_millis)
}

/// Action as stored on a rule, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
}

impl RuleAction {
    pub fn new(action_type: impl Into<String>, config: Value) -> Self {
        Self {
            action_type: action_type.into(),
            config,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn delay_millis(&self) -> i64 {
        delay_millis(self.delay.as_ref())
    }

    /// Parse and validate into a typed action.
    pub fn parse(&self) -> DomainResult<Action> {
        let kind = ActionKind::from_str(&self.action_type)
            .ok_or_else(|| DomainError::UnknownActionType(self.action_type.clone()))?;

        let config = if self.config.is_null() { json!({}) } else { self.config.clone() };
        let action: Action = serde_json::from_value(json!({
            "type": kind.as_str(),
            "config": config,
        }))
        .map_err(|e| DomainError::InvalidActionConfig {
            action_type: self.action_type.clone(),
            reason: e.to_string(),
        })?;

        action.validate()?;
        Ok(action)
    }
}

/// Discriminant of `Action`, used for columns, routing and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    SendSms,
    SendEmail,
    PushNotification,
    CreateTask,
    TransitionPipeline,
    TeamNotification,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::SendSms,
        Self::SendEmail,
        Self::PushNotification,
        Self::CreateTask,
        Self::TransitionPipeline,
        Self::TeamNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendSms => "send-sms",
            Self::SendEmail => "send-email",
            Self::PushNotification => "push-notification",
            Self::CreateTask => "create-task",
            Self::TransitionPipeline => "transition-pipeline",
            Self::TeamNotification => "team-notification",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsConfig {
    pub message: String,
    /// Explicit recipient; defaults to the trigger contact's phone.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailConfig {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationConfig {
    pub title: String,
    pub body: String,
    /// Empty means every team member of the location.
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub due_in_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPipelineConfig {
    pub pipeline_id: String,
    pub stage_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamNotificationConfig {
    pub message: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

/// A validated unit of work a rule can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "kebab-case")]
pub enum Action {
    SendSms(SendSmsConfig),
    SendEmail(SendEmailConfig),
    PushNotification(PushNotificationConfig),
    CreateTask(CreateTaskConfig),
    TransitionPipeline(TransitionPipelineConfig),
    TeamNotification(TeamNotificationConfig),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SendSms(_) => ActionKind::SendSms,
            Self::SendEmail(_) => ActionKind::SendEmail,
            Self::PushNotification(_) => ActionKind::PushNotification,
            Self::CreateTask(_) => ActionKind::CreateTask,
            Self::TransitionPipeline(_) => ActionKind::TransitionPipeline,
            Self::TeamNotification(_) => ActionKind::TeamNotification,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        let invalid = |reason: &str| {
            Err(DomainError::InvalidActionConfig {
                action_type: self.kind().as_str().to_string(),
                reason: reason.to_string(),
            })
        };

        match self {
            Self::SendSms(c) if c.message.trim().is_empty() => invalid("message is empty"),
            Self::SendEmail(c) => {
                let has_template = c.template_id.as_deref().is_some_and(|t| !t.trim().is_empty());
                let has_content = c.subject.as_deref().is_some_and(|s| !s.trim().is_empty())
                    && c.body.as_deref().is_some_and(|b| !b.trim().is_empty());
                if has_template || has_content {
                    Ok(())
                } else {
                    invalid("requires templateId or both subject and body")
                }
            }
            Self::PushNotification(c) if c.title.trim().is_empty() => invalid("title is empty"),
            Self::CreateTask(c) if c.title.trim().is_empty() => invalid("title is empty"),
            Self::TransitionPipeline(c)
                if c.pipeline_id.trim().is_empty() || c.stage_id.trim().is_empty() =>
            {
                invalid("pipelineId and stageId are required")
            }
            Self::TeamNotification(c) if c.message.trim().is_empty() => invalid("message is empty"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_millis() {
        assert_eq!(Delay::minutes(5).as_millis(), 300_000);
        assert_eq!(Delay::hours(2).as_millis(), 7_200_000);
        assert_eq!(Delay::days(1).as_millis(), 86_400_000);
        assert_eq!(delay_millis(None), 0);
    }

    #[test]
    fn test_unknown_delay_unit_contributes_nothing() {
        let delay: Delay = serde_json::from_value(json!({"amount": 3, "unit": "fortnights"})).unwrap();
        assert_eq!(delay.unit, DelayUnit::Unknown);
        assert_eq!(delay.as_millis(), 0);

        let singular: Delay = serde_json::from_value(json!({"amount": 1, "unit": "hour"})).unwrap();
        assert_eq!(singular.as_millis(), HOUR_MS);
    }

    #[test]
    fn test_parse_valid_actions() {
        let sms = RuleAction::new("send-sms", json!({"message": "Thanks {{contact.name}}"}));
        assert_eq!(sms.parse().unwrap().kind(), ActionKind::SendSms);

        let transition = RuleAction::new(
            "transition_pipeline",
            json!({"pipelineId": "p1", "stageId": "won"}),
        );
        match transition.parse().unwrap() {
            Action::TransitionPipeline(c) => assert_eq!(c.stage_id, "won"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let fax = RuleAction::new("send-fax", json!({}));
        assert!(matches!(fax.parse(), Err(DomainError::UnknownActionType(t)) if t == "send-fax"));
    }

    #[test]
    fn test_parse_rejects_invalid_config() {
        let missing_field = RuleAction::new("create-task", json!({}));
        assert!(matches!(
            missing_field.parse(),
            Err(DomainError::InvalidActionConfig { .. })
        ));

        let empty_email = RuleAction::new("send-email", json!({"subject": "Hi"}));
        assert!(matches!(
            empty_email.parse(),
            Err(DomainError::InvalidActionConfig { .. })
        ));

        let template_email = RuleAction::new("send-email", json!({"templateId": "tpl-1"}));
        assert!(template_email.parse().is_ok());
    }

    #[test]
    fn test_action_serializes_with_type_and_config() {
        let action = RuleAction::new("push-notification", json!({"title": "New lead", "body": "x"}))
            .parse()
            .unwrap();
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "push-notification");
        assert_eq!(value["config"]["title"], "New lead");
    }
}
