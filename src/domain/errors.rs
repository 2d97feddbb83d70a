//! Domain errors for the fieldflow automation engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the automation engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Automation rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Queue entry not found: {0}")]
    QueueEntryNotFound(Uuid),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Invalid config for action '{action_type}': {reason}")]
    InvalidActionConfig { action_type: String, reason: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether this error stems from caller input rather than the store.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTrigger(_)
                | Self::UnknownActionType(_)
                | Self::InvalidActionConfig { .. }
                | Self::ValidationFailed(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
