//! Engine services: trigger normalization, rule matching, action expansion,
//! the periodic promoter and the queue worker.

pub mod action_expander;
pub mod automation;
pub mod engine;
pub mod promoter;
pub mod rule_matcher;
pub mod trigger_normalizer;
pub mod worker;

pub use action_expander::{action_hash, canonical_json, trigger_hash, ActionExpander, ExpansionSettings};
pub use automation::{AutomationService, ProcessOutcome};
pub use engine::Engine;
pub use promoter::{Promoter, SweepSummary};
pub use rule_matcher::{select_matching, RuleMatcher};
pub use trigger_normalizer::TriggerNormalizer;
pub use worker::{EntryOutcome, Worker, WorkerReport};
