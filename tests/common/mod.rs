//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use fieldflow::adapters::integrations::LogOnlyExecutor;
use fieldflow::adapters::sqlite::{create_migrated_test_pool, initialize_database, PoolConfig};
use fieldflow::domain::models::{
    AutomationRule, Config, DomainEvent, QueueEntry, RuleAction, RuleTrigger, TriggerType,
};
use fieldflow::domain::ports::{ActionExecutor, ExecutionError, ExecutionReceipt};
use fieldflow::services::Engine;

/// Engine over an in-memory database with a dry-run executor.
pub async fn engine() -> Engine {
    engine_with(Arc::new(LogOnlyExecutor)).await
}

pub async fn engine_with(executor: Arc<dyn ActionExecutor>) -> Engine {
    let pool = create_migrated_test_pool().await.expect("test pool");
    Engine::from_pool(pool, Config::default(), executor)
}

/// Engine over a file-backed database so several connections run at once.
pub async fn file_engine(max_connections: u32) -> (TempDir, Engine) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path: PathBuf = dir.path().join("fieldflow.db");
    let pool = initialize_database(
        &format!("sqlite:{}", db_path.display()),
        Some(PoolConfig::with_max_connections(max_connections)),
    )
    .await
    .expect("file-backed pool");
    let engine = Engine::from_pool(pool, Config::default(), Arc::new(LogOnlyExecutor));
    (dir, engine)
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn project_created(entity_id: &str) -> DomainEvent {
    DomainEvent::new("project-created", "project", entity_id, "loc-1")
}

pub fn sms(message: &str) -> RuleAction {
    RuleAction::new("send-sms", json!({ "message": message }))
}

pub fn project_rule(name: &str) -> AutomationRule {
    AutomationRule::new("loc-1", name, RuleTrigger::new(TriggerType::ProjectCreated))
}

/// Fails the first `failures` calls with the given retryability, then succeeds.
pub struct ScriptedExecutor {
    failures: u32,
    retryable: bool,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self { failures, retryable: true, calls: AtomicU32::new(0) })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(&self, _entry: &QueueEntry) -> Result<ExecutionReceipt, ExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(ExecutionError { message: format!("attempt {} failed", call + 1), retryable: self.retryable })
        } else {
            Ok(ExecutionReceipt::default())
        }
    }
}
