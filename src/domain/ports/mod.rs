//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - RuleRepository: rule definitions and execution statistics
//! - TriggerRepository: ingested triggers (suppression window, recurring bookkeeping)
//! - QueueRepository: queue entries and their conditional state changes
//! - EntityLookup / ReminderSource: read access to CRM collections
//! - ActionExecutor: integration dispatch

pub mod action_executor;
pub mod entity_lookup;
pub mod queue_repository;
pub mod rule_repository;
pub mod trigger_repository;

pub use action_executor::{ActionExecutor, ExecutionError, ExecutionReceipt};
pub use entity_lookup::{EntityLookup, ReminderSource};
pub use queue_repository::{QueueFilter, QueueRepository};
pub use rule_repository::RuleRepository;
pub use trigger_repository::TriggerRepository;
