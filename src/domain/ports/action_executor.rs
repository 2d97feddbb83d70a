//! Port for executing queued actions against external integrations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::QueueEntry;

/// What an integration reported back for a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// Provider-side identifier (message sid, task id), when known.
    pub external_id: Option<String>,
    pub detail: Option<String>,
}

/// Failure of a single execution attempt.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    /// Whether another attempt could succeed. Non-retryable failures fail
    /// the entry immediately.
    pub retryable: bool,
}

impl ExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

/// Dispatches one queue entry to the integration for its action type.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, entry: &QueueEntry) -> Result<ExecutionReceipt, ExecutionError>;
}
