//! Dry-run executor.

use async_trait::async_trait;
use tracing::info;

use crate::domain::models::QueueEntry;
use crate::domain::ports::{ActionExecutor, ExecutionError, ExecutionReceipt};

/// Logs each action and reports success without side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyExecutor;

#[async_trait]
impl ActionExecutor for LogOnlyExecutor {
    async fn execute(&self, entry: &QueueEntry) -> Result<ExecutionReceipt, ExecutionError> {
        let action = serde_json::to_string(&entry.action)
            .map_err(|e| ExecutionError::permanent(format!("unserializable action: {e}")))?;

        info!(
            entry_id = %entry.id,
            rule_id = %entry.rule_id,
            action_type = %entry.action_type,
            location_id = %entry.trigger.location_id,
            action = %action,
            "Dry run: action not dispatched"
        );

        Ok(ExecutionReceipt { external_id: None, detail: Some("dry-run".to_string()) })
    }
}
