//! fieldflow: automation rule engine and delayed-execution queue for a
//! multi-tenant field-service CRM.
//!
//! Domain events are normalized into triggers, matched against tenant
//! rules, and expanded into deduplicated, individually schedulable queue
//! entries. A periodic sweep promotes delayed work and fires time-based
//! rules; workers claim entries and dispatch them to integrations.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, invariants and port traits
//! - **Service Layer** (`services`): normalizer, matcher, expander, promoter, worker
//! - **Adapters** (`adapters`): SQLite persistence, integration executors, HTTP
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Action, ActionKind, AutomationRule, Config, DomainEvent, QueueEntry, QueueStatus, RuleAction,
    RuleTrigger, Trigger, TriggerType,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AutomationService, Engine, ProcessOutcome, SweepSummary, WorkerReport};
