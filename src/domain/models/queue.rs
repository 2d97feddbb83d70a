//! Queue entry domain model.
//!
//! A queue entry is one action of one matched rule, frozen at enqueue time
//! and driven through `pending|scheduled -> processing -> completed|failed`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::action::{Action, ActionKind};
use super::trigger::TriggerSnapshot;
use crate::domain::errors::{DomainError, DomainResult};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Eligible to be claimed by a worker.
    Pending,
    /// Waiting for its due time; the promoter moves it to pending.
    Scheduled,
    /// Claimed by a worker.
    Processing,
    Completed,
    /// Attempts exhausted.
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "scheduled" => Some(Self::Scheduled),
            "processing" => Some(Self::Processing),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<QueueStatus> {
        match self {
            Self::Scheduled => vec![Self::Pending],
            Self::Pending => vec![Self::Processing],
            // Pending again on a retryable failure.
            Self::Processing => vec![Self::Completed, Self::Pending, Self::Failed],
            Self::Completed | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity hashes used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetadata {
    pub trigger_hash: String,
    pub action_hash: String,
}

/// A persisted, independently schedulable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub action_type: ActionKind,
    pub action: Action,
    pub trigger: TriggerSnapshot,
    /// Entity the originating trigger was about.
    pub entity_id: String,
    pub status: QueueStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub metadata: QueueMetadata,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Build a fresh entry; a positive delay makes it `scheduled`.
    ///
    /// Fails with `InvalidActionConfig` when the delay lands outside the
    /// representable calendar.
    pub fn new(
        rule_id: Uuid,
        action: Action,
        trigger: TriggerSnapshot,
        entity_id: impl Into<String>,
        metadata: QueueMetadata,
        delay_ms: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let (status, scheduled_for) = if delay_ms > 0 {
            let due = Duration::try_milliseconds(delay_ms)
                .and_then(|delay| now.checked_add_signed(delay))
                .ok_or_else(|| DomainError::InvalidActionConfig {
                    action_type: action.kind().to_string(),
                    reason: format!("delay of {delay_ms}ms is out of range"),
                })?;
            (QueueStatus::Scheduled, due)
        } else {
            (QueueStatus::Pending, now)
        };

        Ok(Self {
            id: Uuid::new_v4(),
            rule_id,
            action_type: action.kind(),
            action,
            trigger,
            entity_id: entity_id.into(),
            status,
            scheduled_for: Some(scheduled_for),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            metadata,
            last_error: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            completed_at: None,
            failed_at: None,
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Outcome of a guarded enqueue.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Inserted(QueueEntry),
    /// An equivalent entry already holds the dedup slot.
    Duplicate { action_hash: String },
}

/// Outcome of finalizing a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Returned to pending for another claim.
    Retrying { attempts: u32 },
    /// Attempts exhausted.
    Failed { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::action::RuleAction;
    use crate::domain::models::trigger::TriggerType;
    use serde_json::json;

    fn try_entry(delay_ms: i64, now: DateTime<Utc>) -> DomainResult<QueueEntry> {
        let action = RuleAction::new("send-sms", json!({"message": "hi"})).parse().unwrap();
        QueueEntry::new(
            Uuid::new_v4(),
            action,
            TriggerSnapshot {
                trigger_type: TriggerType::ProjectCreated,
                location_id: "loc-1".into(),
                data: json!({}),
            },
            "P1",
            QueueMetadata {
                trigger_hash: "t".into(),
                action_hash: "a".into(),
            },
            delay_ms,
            now,
        )
    }

    fn entry(delay_ms: i64, now: DateTime<Utc>) -> QueueEntry {
        try_entry(delay_ms, now).unwrap()
    }

    #[test]
    fn test_zero_delay_is_pending_now() {
        let now = Utc::now();
        let e = entry(0, now);
        assert_eq!(e.status, QueueStatus::Pending);
        assert_eq!(e.scheduled_for, Some(now));
        assert_eq!(e.attempts, 0);
        assert_eq!(e.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_positive_delay_is_scheduled() {
        let now = Utc::now();
        let e = entry(7_200_000, now);
        assert_eq!(e.status, QueueStatus::Scheduled);
        assert_eq!(e.scheduled_for, Some(now + Duration::hours(2)));
    }

    #[test]
    fn test_state_machine_transitions() {
        assert!(QueueStatus::Scheduled.can_transition_to(QueueStatus::Pending));
        assert!(!QueueStatus::Scheduled.can_transition_to(QueueStatus::Processing));
        assert!(QueueStatus::Pending.can_transition_to(QueueStatus::Processing));
        assert!(QueueStatus::Processing.can_transition_to(QueueStatus::Pending));
        assert!(QueueStatus::Processing.can_transition_to(QueueStatus::Failed));
        assert!(QueueStatus::Completed.valid_transitions().is_empty());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
    }

    #[test]
    fn test_out_of_range_delay_is_rejected() {
        let max_days = crate::domain::models::action::Delay::days(u32::MAX).as_millis();
        let err = try_entry(max_days, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidActionConfig { .. }));
    }
}
