//! Selects the rules a trigger fires.

use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AutomationRule, Trigger};
use crate::domain::ports::RuleRepository;

pub struct RuleMatcher {
    rules: Arc<dyn RuleRepository>,
}

impl RuleMatcher {
    pub fn new(rules: Arc<dyn RuleRepository>) -> Self {
        Self { rules }
    }

    /// Active rules of the trigger's location that apply to it, highest priority first.
    pub async fn match_rules(&self, trigger: &Trigger) -> DomainResult<Vec<AutomationRule>> {
        let candidates = self.rules.list_active_for_location(&trigger.location_id).await?;
        let candidate_count = candidates.len();
        let matched = select_matching(candidates, trigger);

        debug!(
            trigger_type = %trigger.trigger_type,
            location_id = %trigger.location_id,
            candidates = candidate_count,
            matched = matched.len(),
            "Matched rules"
        );
        Ok(matched)
    }
}

/// Filter `rules` down to those that apply to `trigger`, ordered by
/// descending priority with ties broken by name.
pub fn select_matching(rules: Vec<AutomationRule>, trigger: &Trigger) -> Vec<AutomationRule> {
    let mut matched: Vec<AutomationRule> = rules.into_iter().filter(|r| r.applies_to(trigger)).collect();
    matched.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Condition, ConditionOperator, RuleTrigger, TriggerType};
    use serde_json::json;

    fn rule(name: &str, priority: i32, trigger: RuleTrigger) -> AutomationRule {
        AutomationRule::new("loc-1", name, trigger).with_priority(priority)
    }

    #[test]
    fn test_priority_descending_then_name() {
        let trigger = Trigger::new(TriggerType::ProjectCreated, "project", "P1", "loc-1");
        let rules = vec![
            rule("b-low", 1, RuleTrigger::new(TriggerType::ProjectCreated)),
            rule("z-high", 10, RuleTrigger::new(TriggerType::ProjectCreated)),
            rule("a-low", 1, RuleTrigger::new(TriggerType::ProjectCreated)),
            rule("other", 99, RuleTrigger::new(TriggerType::InvoicePaid)),
        ];

        let names: Vec<String> = select_matching(rules, &trigger).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["z-high", "a-low", "b-low"]);
    }

    #[test]
    fn test_stage_alias_and_conditions() {
        let mut trigger = Trigger::new(TriggerType::StageChanged, "project", "P1", "loc-1")
            .with_data(json!({"project": {"value": 500}}));
        trigger.stage_id = Some("won".into());

        let rules = vec![
            rule("stage", 0, RuleTrigger::stage(None, "won")),
            rule("wrong-stage", 0, RuleTrigger::stage(None, "lost")),
            rule("generic", 0, RuleTrigger::new(TriggerType::StageChanged)),
            rule("big-only", 5, RuleTrigger::stage(None, "won")).with_condition(Condition::new(
                "project.value",
                ConditionOperator::GreaterThan,
                json!(1000),
            )),
        ];

        let names: Vec<String> = select_matching(rules, &trigger).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["generic", "stage"]);
    }

    #[test]
    fn test_custom_trigger_types_match_exactly() {
        let trigger = Trigger::new(TriggerType::parse("warranty-expiring"), "project", "P1", "loc-1");
        let rules = vec![
            rule("custom", 0, RuleTrigger::new(TriggerType::parse("warranty-expiring"))),
            rule("near-miss", 0, RuleTrigger::new(TriggerType::parse("warranty-expired"))),
        ];
        let matched = select_matching(rules, &trigger);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "custom");
    }
}
