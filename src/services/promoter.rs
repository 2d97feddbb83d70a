//! Periodic sweep: fires recurring schedules, queues appointment reminders
//! and promotes due scheduled entries.
//!
//! Each sweep is idempotent and independent; a failure in one is logged and
//! reported in the summary without stopping the others.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::schedule::should_fire;
use crate::domain::models::{
    AppointmentSummary, AutomationRule, RecurringConfig, ReminderConfig, Trigger, TriggerType,
};
use crate::domain::ports::{EntityLookup, QueueRepository, ReminderSource, RuleRepository, TriggerRepository};
use crate::services::action_expander::ActionExpander;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub recurring_schedules_checked: u64,
    pub appointment_rules_checked: u64,
    pub scheduled_items_promoted: u64,
    pub recurring_triggers_fired: u64,
    pub reminders_queued: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct Promoter {
    rules: Arc<dyn RuleRepository>,
    triggers: Arc<dyn TriggerRepository>,
    queue: Arc<dyn QueueRepository>,
    reminders: Arc<dyn ReminderSource>,
    entities: Arc<dyn EntityLookup>,
    expander: Arc<ActionExpander>,
    reminder_window: Duration,
}

impl Promoter {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        triggers: Arc<dyn TriggerRepository>,
        queue: Arc<dyn QueueRepository>,
        reminders: Arc<dyn ReminderSource>,
        entities: Arc<dyn EntityLookup>,
        expander: Arc<ActionExpander>,
        reminder_window: Duration,
    ) -> Self {
        Self { rules, triggers, queue, reminders, entities, expander, reminder_window }
    }

    pub async fn run_sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        if let Err(e) = self.sweep_recurring(now, &mut summary).await {
            error!(error = %e, "Recurring schedule sweep failed");
            summary.errors.push(format!("recurring: {e}"));
        }

        if let Err(e) = self.sweep_reminders(now, &mut summary).await {
            error!(error = %e, "Appointment reminder sweep failed");
            summary.errors.push(format!("reminders: {e}"));
        }

        match self.queue.promote_due(now).await {
            Ok(promoted) => summary.scheduled_items_promoted = promoted,
            Err(e) => {
                error!(error = %e, "Scheduled entry promotion failed");
                summary.errors.push(format!("promotion: {e}"));
            }
        }

        info!(
            recurring_checked = summary.recurring_schedules_checked,
            recurring_fired = summary.recurring_triggers_fired,
            appointment_rules_checked = summary.appointment_rules_checked,
            reminders_queued = summary.reminders_queued,
            promoted = summary.scheduled_items_promoted,
            "Automation sweep finished"
        );
        summary
    }

    async fn sweep_recurring(&self, now: DateTime<Utc>, summary: &mut SweepSummary) -> DomainResult<()> {
        let rules = self
            .rules
            .list_active_by_trigger_type(&TriggerType::RecurringSchedule)
            .await?;

        for rule in rules {
            summary.recurring_schedules_checked += 1;

            let config: RecurringConfig = match serde_json::from_value(rule.trigger.config.clone()) {
                Ok(config) => config,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Invalid recurring schedule config");
                    continue;
                }
            };

            let rule_id = rule.id.to_string();
            let last_fired = self
                .triggers
                .last_recorded_at(&TriggerType::RecurringSchedule, "rule", &rule_id)
                .await?;
            let last = rule.execution_stats.last_executed.max(last_fired);

            if !should_fire(last, now, &config) {
                continue;
            }

            let mut trigger = Trigger::new(TriggerType::RecurringSchedule, "rule", rule_id, &rule.location_id)
                .with_data(json!({ "ruleId": rule.id, "firedAt": now.to_rfc3339() }));
            trigger.created_at = now;

            if !rule.applies_to(&trigger) {
                debug!(rule_id = %rule.id, "Recurring rule conditions not met");
                continue;
            }

            // Recorded first so a concurrent sweep sees the interval as taken.
            self.triggers.record(&trigger).await?;
            match self.expander.expand_at(&rule, &trigger, now).await {
                Ok(queued) => {
                    summary.recurring_triggers_fired += 1;
                    info!(rule_id = %rule.id, queued = queued.len(), "Fired recurring schedule");
                }
                Err(e) => {
                    error!(rule_id = %rule.id, error = %e, "Failed to expand recurring rule");
                    summary.errors.push(format!("recurring rule {}: {e}", rule.id));
                }
            }
        }

        Ok(())
    }

    async fn sweep_reminders(&self, now: DateTime<Utc>, summary: &mut SweepSummary) -> DomainResult<()> {
        let rules = self
            .rules
            .list_active_by_trigger_type(&TriggerType::BeforeAppointment)
            .await?;

        for rule in rules {
            summary.appointment_rules_checked += 1;

            let config: ReminderConfig = if rule.trigger.config.is_null() {
                ReminderConfig::default()
            } else {
                match serde_json::from_value(rule.trigger.config.clone()) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(rule_id = %rule.id, error = %e, "Invalid reminder config");
                        continue;
                    }
                }
            };

            let Some((start, end)) = config.window(now, self.reminder_window) else {
                warn!(rule_id = %rule.id, hours_before = config.hours_before, "Reminder lead time out of range");
                continue;
            };
            let appointments = self
                .reminders
                .due_for_reminder(&rule.location_id, rule.trigger.calendar_id.as_deref(), rule.id, start, end)
                .await?;

            for appointment in appointments {
                match self.queue_reminder(&rule, &appointment, now).await {
                    Ok(queued) => summary.reminders_queued += queued,
                    Err(e) => {
                        error!(rule_id = %rule.id, appointment_id = %appointment.id, error = %e, "Failed to queue reminder");
                        summary.errors.push(format!("reminder {} for rule {}: {e}", appointment.id, rule.id));
                    }
                }
            }
        }

        Ok(())
    }

    /// Claim the marker, then expand; the marker is released if expansion fails.
    async fn queue_reminder(
        &self,
        rule: &AutomationRule,
        appointment: &AppointmentSummary,
        now: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let trigger = self.reminder_trigger(rule, appointment, now).await?;
        if !rule.applies_to(&trigger) {
            return Ok(0);
        }

        if !self.reminders.claim_reminder(&appointment.id, rule.id, now).await? {
            debug!(rule_id = %rule.id, appointment_id = %appointment.id, "Reminder already claimed");
            return Ok(0);
        }

        let expanded = match self.triggers.record(&trigger).await {
            Ok(()) => self.expander.expand_at(rule, &trigger, now).await,
            Err(e) => Err(e),
        };

        match expanded {
            Ok(queued) => Ok(queued.len() as u64),
            Err(e) => {
                if let Err(release_err) = self.reminders.release_reminder(&appointment.id, rule.id).await {
                    warn!(appointment_id = %appointment.id, error = %release_err, "Failed to release reminder marker");
                }
                Err(e)
            }
        }
    }

    async fn reminder_trigger(
        &self,
        rule: &AutomationRule,
        appointment: &AppointmentSummary,
        now: DateTime<Utc>,
    ) -> DomainResult<Trigger> {
        let contact = match &appointment.contact_id {
            Some(contact_id) => self.entities.contact(&appointment.location_id, contact_id).await?,
            None => None,
        };

        let mut data = json!({
            "appointmentId": appointment.id,
            "appointment": appointment.projection(),
        });
        let map = data
            .as_object_mut()
            .ok_or_else(|| DomainError::SerializationError("reminder data is not an object".to_string()))?;
        if let Some(contact_id) = &appointment.contact_id {
            map.insert("contactId".to_string(), json!(contact_id));
        }
        if let Some(contact) = contact {
            map.insert("contact".to_string(), contact.projection());
        }

        let mut trigger = Trigger::new(
            TriggerType::BeforeAppointment,
            "appointment",
            &appointment.id,
            &rule.location_id,
        )
        .with_data(data)
        .with_calendar(appointment.calendar_id.clone());
        trigger.created_at = now;
        Ok(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteEntityRepository, SqliteQueueRepository, SqliteRuleRepository,
        SqliteTriggerRepository,
    };
    use crate::domain::models::{ContactSummary, QueueStatus, RuleAction, RuleTrigger};
    use crate::domain::ports::QueueFilter;
    use crate::services::action_expander::ExpansionSettings;
    use chrono::TimeZone;

    struct Fixture {
        promoter: Promoter,
        rules: Arc<SqliteRuleRepository>,
        queue: Arc<SqliteQueueRepository>,
        entities: Arc<SqliteEntityRepository>,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let rules = Arc::new(SqliteRuleRepository::new(pool.clone()));
        let queue = Arc::new(SqliteQueueRepository::new(pool.clone()));
        let triggers = Arc::new(SqliteTriggerRepository::new(pool.clone()));
        let entities = Arc::new(SqliteEntityRepository::new(pool));
        let expander = Arc::new(ActionExpander::new(queue.clone(), ExpansionSettings::default()));
        let promoter = Promoter::new(
            rules.clone(),
            triggers,
            queue.clone(),
            entities.clone(),
            entities.clone(),
            expander,
            Duration::minutes(5),
        );
        Fixture { promoter, rules, queue, entities }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    fn daily_digest() -> AutomationRule {
        AutomationRule::new(
            "loc-1",
            "Daily digest",
            RuleTrigger::new(TriggerType::RecurringSchedule)
                .with_config(json!({"frequency": "daily", "hour": 9})),
        )
        .with_action(RuleAction::new("team-notification", json!({"message": "Morning digest"})))
    }

    #[tokio::test]
    async fn test_recurring_fires_once_per_interval() {
        let fx = setup().await;
        fx.rules.upsert(&daily_digest()).await.unwrap();

        let first = fx.promoter.run_sweep(at(10, 9, 1)).await;
        assert_eq!(first.recurring_schedules_checked, 1);
        assert_eq!(first.recurring_triggers_fired, 1);

        let again = fx.promoter.run_sweep(at(10, 9, 30)).await;
        assert_eq!(again.recurring_triggers_fired, 0);

        let not_due = fx.promoter.run_sweep(at(11, 8, 0)).await;
        assert_eq!(not_due.recurring_triggers_fired, 0);

        let next_day = fx.promoter.run_sweep(at(11, 9, 0)).await;
        assert_eq!(next_day.recurring_triggers_fired, 1);
        assert!(next_day.errors.is_empty());

        assert_eq!(fx.queue.list(QueueFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_recurring_config_is_skipped() {
        let fx = setup().await;
        let broken = AutomationRule::new(
            "loc-1",
            "Broken",
            RuleTrigger::new(TriggerType::RecurringSchedule).with_config(json!({"frequency": "fortnightly"})),
        );
        fx.rules.upsert(&broken).await.unwrap();
        fx.rules.upsert(&daily_digest()).await.unwrap();

        let summary = fx.promoter.run_sweep(at(10, 9, 0)).await;
        assert_eq!(summary.recurring_schedules_checked, 2);
        assert_eq!(summary.recurring_triggers_fired, 1);
    }

    #[tokio::test]
    async fn test_reminder_queued_once_per_appointment() {
        let fx = setup().await;
        let rule = AutomationRule::new(
            "loc-1",
            "Day-before reminder",
            RuleTrigger::new(TriggerType::BeforeAppointment).with_config(json!({"hoursBefore": 24})),
        )
        .with_action(RuleAction::new("send-sms", json!({"message": "See you tomorrow"})));
        fx.rules.upsert(&rule).await.unwrap();

        let now = at(10, 9, 0);
        fx.entities
            .upsert_contact(
                "loc-1",
                &ContactSummary { id: "C1".into(), name: Some("Dana".into()), phone: None, email: None },
            )
            .await
            .unwrap();
        fx.entities
            .upsert_appointment(&AppointmentSummary {
                id: "A1".into(),
                location_id: "loc-1".into(),
                calendar_id: None,
                contact_id: Some("C1".into()),
                title: Some("Inspection".into()),
                status: "scheduled".into(),
                start_time: now + Duration::hours(24) + Duration::minutes(2),
            })
            .await
            .unwrap();

        let first = fx.promoter.run_sweep(now).await;
        assert_eq!(first.appointment_rules_checked, 1);
        assert_eq!(first.reminders_queued, 1);

        let second = fx.promoter.run_sweep(now + Duration::minutes(1)).await;
        assert_eq!(second.reminders_queued, 0);

        let entries = fx.queue.list(QueueFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger.data["contact"]["name"], "Dana");
        assert_eq!(entries[0].entity_id, "A1");
    }

    #[tokio::test]
    async fn test_out_of_range_reminder_lead_is_skipped() {
        let fx = setup().await;
        let far = AutomationRule::new(
            "loc-1",
            "Absurd lead",
            RuleTrigger::new(TriggerType::BeforeAppointment).with_config(json!({"hoursBefore": u32::MAX})),
        )
        .with_action(RuleAction::new("send-sms", json!({"message": "Too early"})));
        fx.rules.upsert(&far).await.unwrap();
        fx.rules.upsert(&daily_digest()).await.unwrap();

        let summary = fx.promoter.run_sweep(at(10, 9, 0)).await;
        assert_eq!(summary.appointment_rules_checked, 1);
        assert_eq!(summary.reminders_queued, 0);
        assert_eq!(summary.recurring_triggers_fired, 1);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_promotion_runs_even_without_rules() {
        let fx = setup().await;
        let rule = AutomationRule::new("loc-1", "Later", RuleTrigger::new(TriggerType::ProjectCreated))
            .with_action(
                RuleAction::new("send-sms", json!({"message": "Follow up"}))
                    .with_delay(crate::domain::models::Delay::hours(2)),
            );
        let expander = ActionExpander::new(fx.queue.clone(), ExpansionSettings::default());
        let trigger = Trigger::new(TriggerType::ProjectCreated, "project", "P1", "loc-1");
        let created = at(10, 9, 0);
        expander.expand_at(&rule, &trigger, created).await.unwrap();

        let early = fx.promoter.run_sweep(created + Duration::minutes(119)).await;
        assert_eq!(early.scheduled_items_promoted, 0);

        let due = fx.promoter.run_sweep(created + Duration::hours(2)).await;
        assert_eq!(due.scheduled_items_promoted, 1);

        let entries = fx.queue.list(QueueFilter::default()).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Pending);
    }
}
