//! End-to-end flows through the engine: ingest, match, expand, promote, execute.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::{at, engine, engine_with, project_created, project_rule, sms, ScriptedExecutor};
use fieldflow::domain::models::{
    AppointmentSummary, AutomationRule, Condition, ConditionOperator, ContactSummary, Delay,
    DomainEvent, ProjectSummary, QueueStatus, RuleAction, RuleTrigger, TriggerType,
};
use fieldflow::domain::ports::{QueueFilter, RuleRepository};

fn within_a_second(actual: chrono::DateTime<Utc>, expected: chrono::DateTime<Utc>) -> bool {
    (actual - expected).num_milliseconds().abs() <= 1000
}

#[tokio::test]
async fn test_rule_with_immediate_and_delayed_actions() {
    let engine = engine().await;
    let rule = project_rule("Welcome")
        .with_action(sms("Thanks for choosing us"))
        .with_action(
            RuleAction::new("create-task", json!({"title": "Follow up call"})).with_delay(Delay::days(1)),
        );
    engine.rules.upsert(&rule).await.unwrap();

    let now = Utc::now();
    let outcome = engine.automation.process_event_at(project_created("P1"), now).await.unwrap();
    assert_eq!(outcome.matched_rules, vec![rule.id]);
    assert_eq!(outcome.queued.len(), 2);

    let entries = engine.queue.list(QueueFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 2);

    let pending = entries.iter().find(|e| e.status == QueueStatus::Pending).unwrap();
    assert_eq!(pending.action_type.as_str(), "send-sms");
    assert!(within_a_second(pending.scheduled_for.unwrap(), now));

    let scheduled = entries.iter().find(|e| e.status == QueueStatus::Scheduled).unwrap();
    assert_eq!(scheduled.action_type.as_str(), "create-task");
    assert!(within_a_second(
        scheduled.scheduled_for.unwrap(),
        now + Duration::milliseconds(86_400_000)
    ));
    assert_eq!(scheduled.entity_id, "P1");
}

#[tokio::test]
async fn test_duplicate_delivery_is_suppressed() {
    let engine = engine().await;
    let rule = project_rule("Welcome").with_action(sms("Hi"));
    engine.rules.upsert(&rule).await.unwrap();

    let now = Utc::now();
    let first = engine.automation.process_event_at(project_created("P1"), now).await.unwrap();
    let second = engine
        .automation
        .process_event_at(project_created("P1"), now + Duration::seconds(2))
        .await
        .unwrap();

    assert!(!first.suppressed());
    assert!(second.suppressed());
    assert!(second.queued.is_empty());

    // Past the trigger window, the action window still holds the slot.
    let third = engine
        .automation
        .process_event_at(project_created("P1"), now + Duration::seconds(30))
        .await
        .unwrap();
    assert!(!third.suppressed());
    assert_eq!(third.matched_rules.len(), 1);
    assert!(third.queued.is_empty());

    assert_eq!(engine.queue.list(QueueFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_other_entities_are_not_suppressed() {
    let engine = engine().await;
    engine.rules.upsert(&project_rule("Welcome").with_action(sms("Hi"))).await.unwrap();

    let now = Utc::now();
    engine.automation.process_event_at(project_created("P1"), now).await.unwrap();
    let other = engine.automation.process_event_at(project_created("P2"), now).await.unwrap();
    assert_eq!(other.queued.len(), 1);
}

#[tokio::test]
async fn test_priority_ordering() {
    let engine = engine().await;
    let low = project_rule("Low").with_priority(1).with_action(sms("low"));
    let high = project_rule("High").with_priority(10).with_action(sms("high"));
    engine.rules.upsert(&low).await.unwrap();
    engine.rules.upsert(&high).await.unwrap();

    let outcome = engine.automation.process_event(project_created("P1")).await.unwrap();
    assert_eq!(outcome.matched_rules, vec![high.id, low.id]);
}

#[tokio::test]
async fn test_tenant_isolation_and_inactive_rules() {
    let engine = engine().await;
    let other_tenant = AutomationRule::new("loc-2", "Elsewhere", RuleTrigger::new(TriggerType::ProjectCreated))
        .with_action(sms("nope"));
    let inactive = project_rule("Off").inactive().with_action(sms("nope"));
    engine.rules.upsert(&other_tenant).await.unwrap();
    engine.rules.upsert(&inactive).await.unwrap();

    let outcome = engine.automation.process_event(project_created("P1")).await.unwrap();
    assert!(outcome.matched_rules.is_empty());
    assert!(outcome.queued.is_empty());
}

#[tokio::test]
async fn test_stage_alias_and_enriched_conditions() {
    let engine = engine().await;
    engine
        .entities
        .upsert_project(
            "loc-1",
            &ProjectSummary {
                id: "P1".into(),
                name: Some("Roof replacement".into()),
                value: Some(9000.0),
                contact_id: Some("C1".into()),
                pipeline_id: Some("pipe-1".into()),
                stage_id: Some("won".into()),
            },
        )
        .await
        .unwrap();

    let rule = AutomationRule::new("loc-1", "Big win", RuleTrigger::stage(Some("pipe-1".into()), "won"))
        .with_condition(Condition::new("project.value", ConditionOperator::GreaterThan, json!(5000)))
        .with_action(RuleAction::new("team-notification", json!({"message": "Big job won"})));
    engine.rules.upsert(&rule).await.unwrap();

    let event = DomainEvent::new("stage-changed", "project", "P1", "loc-1").with_stage("pipe-1", "won");
    let outcome = engine.automation.process_event(event).await.unwrap();
    assert_eq!(outcome.matched_rules, vec![rule.id]);

    let trigger = outcome.trigger.unwrap();
    assert_eq!(trigger.data["contactId"], "C1");
    assert_eq!(trigger.data["project"]["value"], 9000.0);
}

#[tokio::test]
async fn test_unknown_action_does_not_block_siblings() {
    let engine = engine().await;
    let rule = project_rule("Mixed")
        .with_action(RuleAction::new("send-fax", json!({"number": "555"})))
        .with_action(sms("still sent"));
    engine.rules.upsert(&rule).await.unwrap();

    let outcome = engine.automation.process_event(project_created("P1")).await.unwrap();
    assert_eq!(outcome.queued.len(), 1);
}

#[tokio::test]
async fn test_out_of_range_delay_is_skipped_not_fatal() {
    let engine = engine().await;
    let rule = project_rule("Far future")
        .with_action(
            RuleAction::new("create-task", json!({"title": "Someday"})).with_delay(Delay::days(u32::MAX)),
        )
        .with_action(sms("Welcome aboard"));
    engine.rules.upsert(&rule).await.unwrap();

    let outcome = engine.automation.process_event(project_created("P1")).await.unwrap();
    assert_eq!(outcome.queued.len(), 1);

    let entries = engine.queue.list(QueueFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let engine = engine().await;
    let err = engine
        .automation
        .process_event(DomainEvent::new("project-created", "project", "P1", ""))
        .await
        .unwrap_err();
    assert!(err.is_input_error());

    assert!(engine
        .automation
        .process_event_best_effort(DomainEvent::new("", "project", "P1", "loc-1"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_promotion_clears_schedule() {
    let engine = engine().await;
    let rule = project_rule("Later").with_action(sms("Two hours later").with_delay(Delay::hours(2)));
    engine.rules.upsert(&rule).await.unwrap();

    let t0 = Utc::now();
    engine.automation.process_event_at(project_created("P1"), t0).await.unwrap();

    let early = engine.promoter.run_sweep(t0 + Duration::hours(1)).await;
    assert_eq!(early.scheduled_items_promoted, 0);

    let due = engine.promoter.run_sweep(t0 + Duration::hours(3)).await;
    assert_eq!(due.scheduled_items_promoted, 1);
    assert!(due.errors.is_empty());

    let entries = engine.queue.list(QueueFilter::default()).await.unwrap();
    assert_eq!(entries[0].status, QueueStatus::Pending);
    assert_eq!(entries[0].scheduled_for, None);
}

fn daily_at_nine() -> AutomationRule {
    AutomationRule::new(
        "loc-1",
        "Morning digest",
        RuleTrigger::new(TriggerType::RecurringSchedule).with_config(json!({"frequency": "daily", "hour": 9})),
    )
    .with_action(RuleAction::new("team-notification", json!({"message": "Good morning"})))
}

#[tokio::test]
async fn test_recurring_schedule_fires_once_per_interval() {
    let engine = engine().await;
    engine.rules.upsert(&daily_at_nine()).await.unwrap();

    let first = engine.promoter.run_sweep(at(2026, 3, 10, 9, 5)).await;
    assert_eq!(first.recurring_schedules_checked, 1);
    assert_eq!(first.recurring_triggers_fired, 1);

    let again = engine.promoter.run_sweep(at(2026, 3, 10, 9, 40)).await;
    assert_eq!(again.recurring_triggers_fired, 0);

    let off_hour = engine.promoter.run_sweep(at(2026, 3, 10, 10, 5)).await;
    assert_eq!(off_hour.recurring_triggers_fired, 0);

    let next_day = engine.promoter.run_sweep(at(2026, 3, 11, 9, 1)).await;
    assert_eq!(next_day.recurring_triggers_fired, 1);

    assert_eq!(engine.queue.list(QueueFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_recurring_guard_uses_last_executed() {
    let engine = engine().await;
    let rule = daily_at_nine();
    engine.rules.upsert(&rule).await.unwrap();
    engine.rules.record_success(rule.id, at(2026, 3, 10, 9, 2)).await.unwrap();

    let summary = engine.promoter.run_sweep(at(2026, 3, 10, 9, 30)).await;
    assert_eq!(summary.recurring_triggers_fired, 0);
    assert!(engine.queue.list(QueueFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_appointment_reminders_are_queued_once() {
    let engine = engine().await;
    let now = at(2026, 3, 10, 12, 0);
    engine
        .entities
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
    for (id, status) in [("A1", "confirmed"), ("A2", "cancelled")] {
        engine
            .entities
            .upsert_appointment(&AppointmentSummary {
                id: id.into(),
                location_id: "loc-1".into(),
                calendar_id: Some("cal-1".into()),
                contact_id: Some("C1".into()),
                title: Some("Estimate visit".into()),
                status: status.into(),
                start_time: now + Duration::hours(24) + Duration::minutes(2),
            })
            .await
            .unwrap();
    }

    let rule = AutomationRule::new(
        "loc-1",
        "Day-before reminder",
        RuleTrigger::new(TriggerType::BeforeAppointment).with_config(json!({"hoursBefore": 24})),
    )
    .with_action(sms("See you tomorrow"));
    engine.rules.upsert(&rule).await.unwrap();

    let first = engine.promoter.run_sweep(now).await;
    assert_eq!(first.appointment_rules_checked, 1);
    assert_eq!(first.reminders_queued, 1);

    let second = engine.promoter.run_sweep(now + Duration::minutes(1)).await;
    assert_eq!(second.reminders_queued, 0);

    let entries = engine.queue.list(QueueFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_id, "A1");
    assert_eq!(entries[0].trigger.data["contact"]["phone"], "+15550100");
}

#[tokio::test]
async fn test_retry_then_terminal_failure_counts_once() {
    let executor = ScriptedExecutor::always_failing();
    let engine = engine_with(executor.clone()).await;
    let rule = project_rule("Welcome").with_action(sms("Hi"));
    engine.rules.upsert(&rule).await.unwrap();
    engine.automation.process_event(project_created("P1")).await.unwrap();

    for _ in 0..3 {
        engine.worker.run_once(10).await.unwrap();
    }
    assert_eq!(executor.calls(), 3);

    let entries = engine.queue.list(QueueFilter::default()).await.unwrap();
    assert_eq!(entries[0].status, QueueStatus::Failed);
    assert_eq!(entries[0].attempts, 3);
    assert_eq!(entries[0].last_error.as_deref(), Some("attempt 3 failed"));

    let stats = engine.rules.get(rule.id).await.unwrap().unwrap().execution_stats;
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.success_count, 0);

    // Terminal entries release the dedup slot, so the same work can be queued again.
    let retry = engine
        .automation
        .process_event_at(project_created("P1"), Utc::now() + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(retry.queued.len(), 1);
}

#[tokio::test]
async fn test_worker_completes_promoted_work() {
    let executor = ScriptedExecutor::failing(0);
    let engine = engine_with(executor.clone()).await;
    let rule = project_rule("Later").with_action(sms("Later").with_delay(Delay::minutes(30)));
    engine.rules.upsert(&rule).await.unwrap();

    let t0 = Utc::now() - Duration::hours(1);
    engine.automation.process_event_at(project_created("P1"), t0).await.unwrap();

    // Scheduled work is invisible to the worker until promoted.
    assert_eq!(engine.worker.run_once(10).await.unwrap().claimed, 0);
    engine.promoter.run_sweep(Utc::now()).await;
    let report = engine.worker.run_once(10).await.unwrap();
    assert_eq!(report.completed, 1);

    let stats = engine.rules.get(rule.id).await.unwrap().unwrap().execution_stats;
    assert_eq!(stats.success_count, 1);
    assert_eq!(executor.calls(), 1);
}
