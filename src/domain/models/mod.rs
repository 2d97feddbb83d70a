//! Domain models for the automation engine.

pub mod action;
pub mod condition;
pub mod config;
pub mod entities;
pub mod queue;
pub mod rule;
pub mod schedule;
pub mod trigger;

pub use action::{Action, ActionKind, Delay, DelayUnit, RuleAction};
pub use condition::{Condition, ConditionOperator};
pub use config::{
    AutomationConfig, Config, CronConfig, DatabaseConfig, IntegrationsConfig, LoggingConfig,
    ServerConfig, WorkerConfig,
};
pub use entities::{AppointmentSummary, ContactSummary, ProjectSummary};
pub use queue::{
    EnqueueOutcome, FailureOutcome, QueueEntry, QueueMetadata, QueueStatus, DEFAULT_MAX_ATTEMPTS,
};
pub use rule::{AutomationRule, ExecutionStats, RuleTrigger};
pub use schedule::{Frequency, RecurringConfig, ReminderConfig};
pub use trigger::{DomainEvent, Trigger, TriggerSnapshot, TriggerType};
