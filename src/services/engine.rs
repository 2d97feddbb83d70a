//! Wires the SQLite adapters and services into one engine.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::adapters::integrations::build_executor;
use crate::adapters::sqlite::{
    initialize_database, DatabaseError, PoolConfig, SqliteEntityRepository, SqliteQueueRepository,
    SqliteRuleRepository, SqliteTriggerRepository,
};
use crate::domain::errors::DomainError;
use crate::domain::models::Config;
use crate::domain::ports::{ActionExecutor, QueueRepository, RuleRepository};
use crate::services::action_expander::{seconds, ActionExpander, ExpansionSettings};
use crate::services::automation::AutomationService;
use crate::services::promoter::Promoter;
use crate::services::rule_matcher::RuleMatcher;
use crate::services::trigger_normalizer::TriggerNormalizer;
use crate::services::worker::Worker;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Everything the CLI and HTTP server need, sharing one pool.
#[derive(Clone)]
pub struct Engine {
    pub pool: SqlitePool,
    pub rules: Arc<dyn RuleRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub entities: Arc<SqliteEntityRepository>,
    pub automation: Arc<AutomationService>,
    pub promoter: Arc<Promoter>,
    pub worker: Arc<Worker>,
    pub config: Config,
}

impl Engine {
    /// Open the configured database, apply migrations and pick an executor.
    pub async fn open(config: Config) -> Result<Self, EngineError> {
        let pool = initialize_database(
            &config.database.url(),
            Some(PoolConfig::from(&config.database)),
        )
        .await?;
        let executor = build_executor(&config.integrations)?;
        Ok(Self::from_pool(pool, config, executor))
    }

    pub fn from_pool(pool: SqlitePool, config: Config, executor: Arc<dyn ActionExecutor>) -> Self {
        let rules = Arc::new(SqliteRuleRepository::new(pool.clone()));
        let queue = Arc::new(SqliteQueueRepository::new(pool.clone()));
        let triggers = Arc::new(SqliteTriggerRepository::new(pool.clone()));
        let entities = Arc::new(SqliteEntityRepository::new(pool.clone()));

        let automation_config = &config.automation;
        let expander = Arc::new(ActionExpander::new(
            queue.clone(),
            ExpansionSettings::from(automation_config),
        ));
        let normalizer = Arc::new(TriggerNormalizer::new(
            triggers.clone(),
            entities.clone(),
            seconds(automation_config.trigger_dedup_secs),
        ));
        let automation = Arc::new(AutomationService::new(
            normalizer,
            Arc::new(RuleMatcher::new(rules.clone())),
            expander.clone(),
        ));
        let promoter = Arc::new(Promoter::new(
            rules.clone(),
            triggers,
            queue.clone(),
            entities.clone(),
            entities.clone(),
            expander,
            seconds(automation_config.reminder_window_minutes.saturating_mul(60)),
        ));
        let worker = Arc::new(Worker::new(queue.clone(), rules.clone(), executor, config.worker.clone()));

        Self { pool, rules, queue, entities, automation, promoter, worker, config }
    }
}
