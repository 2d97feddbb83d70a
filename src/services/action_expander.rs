//! Expands a matched rule into queue entries.
//!
//! Each action gets two identity hashes. The trigger hash identifies the
//! (rule, trigger type, contact, tenant) combination; the action hash adds
//! the action's type, canonical config and entity. Neither hash has any
//! wall-clock input, so replays of the same event collapse onto the same
//! action hash and are deduplicated by the queue.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActionKind, AutomationConfig, AutomationRule, EnqueueOutcome, QueueEntry, QueueMetadata, Trigger,
    TriggerType,
};
use crate::domain::ports::QueueRepository;

const FIELD_SEPARATOR: u8 = 0x1f;

/// Dedup windows and retry limit applied to new entries.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionSettings {
    pub action_window: Duration,
    /// Window for push notifications that run immediately.
    pub push_window: Duration,
    pub max_attempts: u32,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self::from(&AutomationConfig::default())
    }
}

impl From<&AutomationConfig> for ExpansionSettings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            action_window: seconds(config.action_dedup_secs),
            push_window: seconds(config.push_dedup_secs),
            max_attempts: config.max_attempts,
        }
    }
}

/// Whole seconds as a chrono duration, saturating at one year.
pub(crate) fn seconds(secs: u64) -> Duration {
    const MAX_SECS: u64 = 365 * 24 * 3600;
    Duration::seconds(i64::try_from(secs.min(MAX_SECS)).unwrap_or(0))
}

impl ExpansionSettings {
    pub fn window_for(&self, kind: ActionKind, delay_ms: i64) -> Duration {
        if kind == ActionKind::PushNotification && delay_ms <= 0 {
            self.push_window
        } else {
            self.action_window
        }
    }
}

pub struct ActionExpander {
    queue: Arc<dyn QueueRepository>,
    settings: ExpansionSettings,
}

impl ActionExpander {
    pub fn new(queue: Arc<dyn QueueRepository>, settings: ExpansionSettings) -> Self {
        Self { queue, settings }
    }

    /// Enqueue every valid action of `rule` for `trigger`. Returns the
    /// entries actually written; duplicates and invalid actions are skipped.
    pub async fn expand(&self, rule: &AutomationRule, trigger: &Trigger) -> DomainResult<Vec<QueueEntry>> {
        self.expand_at(rule, trigger, Utc::now()).await
    }

    pub async fn expand_at(
        &self,
        rule: &AutomationRule,
        trigger: &Trigger,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<QueueEntry>> {
        let t_hash = trigger_hash(rule.id, &trigger.trigger_type, trigger.contact_id(), &trigger.location_id);
        let mut queued = Vec::new();

        for (index, rule_action) in rule.actions.iter().enumerate() {
            let action = match rule_action.parse() {
                Ok(action) => action,
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        action_index = index,
                        action_type = %rule_action.action_type,
                        error = %e,
                        "Skipping invalid action"
                    );
                    continue;
                }
            };

            let kind = action.kind();
            let a_hash = action_hash(&t_hash, kind, &rule_action.config, &trigger.entity_id);
            let delay_ms = rule_action.delay_millis();
            let window_start = now - self.settings.window_for(kind, delay_ms);

            if let Some(existing) = self.queue.find_active_duplicate(&a_hash, window_start).await? {
                debug!(
                    rule_id = %rule.id,
                    action_index = index,
                    existing_entry = %existing.id,
                    "Skipping duplicate action"
                );
                continue;
            }

            let entry = match QueueEntry::new(
                rule.id,
                action,
                trigger.snapshot(),
                trigger.entity_id.clone(),
                QueueMetadata { trigger_hash: t_hash.clone(), action_hash: a_hash },
                delay_ms,
                now,
            ) {
                Ok(entry) => entry.with_max_attempts(self.settings.max_attempts),
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        action_index = index,
                        action_type = %rule_action.action_type,
                        error = %e,
                        "Skipping invalid action"
                    );
                    continue;
                }
            };

            match self.queue.enqueue(&entry, window_start).await? {
                EnqueueOutcome::Inserted(entry) => {
                    info!(
                        entry_id = %entry.id,
                        rule_id = %rule.id,
                        action_type = %entry.action_type,
                        status = %entry.status,
                        "Queued action"
                    );
                    queued.push(entry);
                }
                EnqueueOutcome::Duplicate { action_hash } => {
                    debug!(rule_id = %rule.id, action_index = index, %action_hash, "Lost enqueue race to identical action");
                }
            }
        }

        Ok(queued)
    }
}

/// `sha256(ruleId, trigger type, contact id, location id)` as hex.
pub fn trigger_hash(
    rule_id: Uuid,
    trigger_type: &TriggerType,
    contact_id: Option<&str>,
    location_id: &str,
) -> String {
    let rule_id = rule_id.to_string();
    digest(&[
        rule_id.as_str(),
        trigger_type.as_str(),
        contact_id.unwrap_or(""),
        location_id,
    ])
}

/// `sha256(trigger hash, action type, canonical config, entity id)` as hex.
pub fn action_hash(trigger_hash: &str, kind: ActionKind, config: &Value, entity_id: &str) -> String {
    let config = canonical_json(config);
    digest(&[trigger_hash, kind.as_str(), config.as_str(), entity_id])
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

/// Serialize with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteQueueRepository};
    use crate::domain::models::{Delay, QueueStatus, RuleAction, RuleTrigger};
    use crate::domain::ports::QueueFilter;
    use proptest::prelude::*;
    use serde_json::json;

    async fn setup() -> (ActionExpander, Arc<SqliteQueueRepository>) {
        let queue = Arc::new(SqliteQueueRepository::new(create_migrated_test_pool().await.unwrap()));
        (ActionExpander::new(queue.clone(), ExpansionSettings::default()), queue)
    }

    fn trigger() -> Trigger {
        Trigger::new(TriggerType::ProjectCreated, "project", "P1", "loc-1")
            .with_data(json!({"contactId": "C1"}))
    }

    #[test]
    fn test_hashes_have_no_time_component() {
        let rule_id = Uuid::new_v4();
        let a = trigger_hash(rule_id, &TriggerType::ProjectCreated, Some("C1"), "loc-1");
        let b = trigger_hash(rule_id, &TriggerType::ProjectCreated, Some("C1"), "loc-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, trigger_hash(rule_id, &TriggerType::ProjectCreated, Some("C2"), "loc-1"));

        let config = json!({"message": "Hi"});
        assert_eq!(
            action_hash(&a, ActionKind::SendSms, &config, "P1"),
            action_hash(&b, ActionKind::SendSms, &config, "P1")
        );
        assert_ne!(
            action_hash(&a, ActionKind::SendSms, &config, "P1"),
            action_hash(&a, ActionKind::SendSms, &config, "P2")
        );
    }

    #[test]
    fn test_fields_cannot_bleed_into_each_other() {
        let rule_id = Uuid::new_v4();
        let a = trigger_hash(rule_id, &TriggerType::parse("x"), Some("ab"), "c");
        let b = trigger_hash(rule_id, &TriggerType::parse("x"), Some("a"), "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": [1, {"q": 2, "p": 1}], "x": null}});
        assert_eq!(canonical_json(&a), r#"{"a":{"x":null,"y":[1,{"p":1,"q":2}]},"b":1}"#);
    }

    #[test]
    fn test_push_window_only_for_immediate_push() {
        let settings = ExpansionSettings::default();
        assert_eq!(settings.window_for(ActionKind::PushNotification, 0), Duration::seconds(30));
        assert_eq!(settings.window_for(ActionKind::PushNotification, 60_000), Duration::minutes(10));
        assert_eq!(settings.window_for(ActionKind::SendSms, 0), Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_expand_queues_each_valid_action() {
        let (expander, queue) = setup().await;
        let rule = AutomationRule::new("loc-1", "Welcome", RuleTrigger::new(TriggerType::ProjectCreated))
            .with_action(RuleAction::new("send-sms", json!({"message": "Welcome!"})))
            .with_action(RuleAction::new("fax", json!({})))
            .with_action(RuleAction::new("send-sms", json!({"message": ""})))
            .with_action(
                RuleAction::new("create-task", json!({"title": "Call back"})).with_delay(Delay::days(1)),
            );
        let now = Utc::now();

        let queued = expander.expand_at(&rule, &trigger(), now).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].status, QueueStatus::Pending);
        assert_eq!(queued[1].status, QueueStatus::Scheduled);
        assert_eq!(queued[1].scheduled_for, Some(now + Duration::days(1)));
        assert_eq!(queue.list(QueueFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_delay_skips_only_that_action() {
        let (expander, queue) = setup().await;
        let rule = AutomationRule::new("loc-1", "Far future", RuleTrigger::new(TriggerType::ProjectCreated))
            .with_action(
                RuleAction::new("create-task", json!({"title": "Never"})).with_delay(Delay::days(u32::MAX)),
            )
            .with_action(RuleAction::new("send-sms", json!({"message": "Welcome!"})));

        let queued = expander.expand_at(&rule, &trigger(), Utc::now()).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].action_type, ActionKind::SendSms);
        assert_eq!(queue.list(QueueFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_trigger_is_idempotent() {
        let (expander, queue) = setup().await;
        let rule = AutomationRule::new("loc-1", "Welcome", RuleTrigger::new(TriggerType::ProjectCreated))
            .with_action(RuleAction::new("send-sms", json!({"message": "Welcome!"})));
        let now = Utc::now();

        let first = expander.expand_at(&rule, &trigger(), now).await.unwrap();
        let replay = expander
            .expand_at(&rule, &trigger(), now + Duration::minutes(3))
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(replay.is_empty());
        assert_eq!(queue.list(QueueFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_max_attempts_from_settings() {
        let queue = Arc::new(SqliteQueueRepository::new(create_migrated_test_pool().await.unwrap()));
        let settings = ExpansionSettings { max_attempts: 5, ..ExpansionSettings::default() };
        let expander = ActionExpander::new(queue, settings);
        let rule = AutomationRule::new("loc-1", "Ping", RuleTrigger::new(TriggerType::ProjectCreated))
            .with_action(RuleAction::new("push-notification", json!({"title": "New job"})));

        let queued = expander.expand(&rule, &trigger()).await.unwrap();
        assert_eq!(queued[0].max_attempts, 5);
    }

    proptest! {
        #[test]
        fn prop_action_hash_ignores_key_order(a in 0i64..1000, b in "[a-z]{0,12}") {
            let one = json!({"amount": a, "label": b, "nested": {"k1": 1, "k2": [a]}});
            let two = json!({"nested": {"k2": [a], "k1": 1}, "label": b, "amount": a});
            prop_assert_eq!(
                action_hash("t", ActionKind::SendEmail, &one, "E"),
                action_hash("t", ActionKind::SendEmail, &two, "E")
            );
        }
    }
}
