//! One-call pipeline for event producers: normalize, match, expand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DomainEvent, Trigger};
use crate::services::action_expander::ActionExpander;
use crate::services::rule_matcher::RuleMatcher;
use crate::services::trigger_normalizer::TriggerNormalizer;

/// Result of processing one domain event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    /// `None` when the event was suppressed as a repeat.
    pub trigger: Option<Trigger>,
    pub matched_rules: Vec<Uuid>,
    /// Ids of the queue entries written.
    pub queued: Vec<Uuid>,
}

impl ProcessOutcome {
    pub fn suppressed(&self) -> bool {
        self.trigger.is_none()
    }
}

pub struct AutomationService {
    normalizer: Arc<TriggerNormalizer>,
    matcher: Arc<RuleMatcher>,
    expander: Arc<ActionExpander>,
}

impl AutomationService {
    pub fn new(normalizer: Arc<TriggerNormalizer>, matcher: Arc<RuleMatcher>, expander: Arc<ActionExpander>) -> Self {
        Self { normalizer, matcher, expander }
    }

    pub async fn process_event(&self, event: DomainEvent) -> DomainResult<ProcessOutcome> {
        self.process_event_at(event, Utc::now()).await
    }

    /// Errors expanding one rule are logged and do not stop the others.
    pub async fn process_event_at(&self, event: DomainEvent, now: DateTime<Utc>) -> DomainResult<ProcessOutcome> {
        let Some(trigger) = self.normalizer.ingest_at(event, now).await? else {
            return Ok(ProcessOutcome::default());
        };

        let rules = self.matcher.match_rules(&trigger).await?;
        let mut outcome = ProcessOutcome {
            matched_rules: rules.iter().map(|r| r.id).collect(),
            ..ProcessOutcome::default()
        };

        for rule in &rules {
            match self.expander.expand_at(rule, &trigger, now).await {
                Ok(entries) => outcome.queued.extend(entries.iter().map(|e| e.id)),
                Err(e) => error!(rule_id = %rule.id, trigger_id = %trigger.id, error = %e, "Failed to expand rule"),
            }
        }

        outcome.trigger = Some(trigger);
        Ok(outcome)
    }

    /// For producers whose own request must not fail because of automation.
    pub async fn process_event_best_effort(&self, event: DomainEvent) -> Option<ProcessOutcome> {
        let event_type = event.event_type.clone();
        let entity_id = event.entity_id.clone();
        match self.process_event(event).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(%event_type, %entity_id, error = %e, "Automation processing failed");
                None
            }
        }
    }
}
