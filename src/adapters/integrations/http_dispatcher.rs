//! Dispatches actions to an HTTP integration gateway.
//!
//! Each entry is POSTed as JSON to `{base_url}/{action-type}`. Any 2xx is a
//! success; 408, 429 and 5xx are retryable, other statuses are permanent.
//! The entry id is sent as `Idempotency-Key` so a gateway can drop repeats.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActionKind, QueueEntry};
use crate::domain::ports::{ActionExecutor, ExecutionError, ExecutionReceipt};

const MAX_ERROR_BODY: usize = 512;

pub struct HttpActionDispatcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpActionDispatcher {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn endpoint(&self, kind: ActionKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str())
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl ActionExecutor for HttpActionDispatcher {
    async fn execute(&self, entry: &QueueEntry) -> Result<ExecutionReceipt, ExecutionError> {
        let url = self.endpoint(entry.action_type);
        let payload = json!({
            "entryId": entry.id,
            "ruleId": entry.rule_id,
            "actionType": entry.action_type,
            "action": entry.action,
            "trigger": entry.trigger,
        });

        let mut request = self
            .client
            .post(&url)
            .header("Idempotency-Key", entry.id.to_string())
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::retryable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            debug!(entry_id = %entry.id, %url, %status, "Integration accepted action");
            let parsed: Option<Value> = serde_json::from_str(&body).ok();
            let external_id = parsed.as_ref().and_then(|v| {
                v.get("externalId")
                    .or_else(|| v.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
            return Ok(ExecutionReceipt { external_id, detail: Some(status.to_string()) });
        }

        let message = format!("integration returned {status}: {}", truncate(&body));
        if is_retryable(status) {
            Err(ExecutionError::retryable(message))
        } else {
            Err(ExecutionError::permanent(message))
        }
    }
}
