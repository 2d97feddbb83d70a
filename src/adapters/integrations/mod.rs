//! Executors that carry queued actions out to the integration gateway.

pub mod http_dispatcher;
pub mod log_only;

pub use http_dispatcher::HttpActionDispatcher;
pub use log_only::LogOnlyExecutor;

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::IntegrationsConfig;
use crate::domain::ports::ActionExecutor;

/// HTTP dispatcher when a gateway is configured, otherwise a dry run.
pub fn build_executor(config: &IntegrationsConfig) -> DomainResult<Arc<dyn ActionExecutor>> {
    match config.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(base_url) => {
            tracing::info!(base_url, "Dispatching actions over HTTP");
            Ok(Arc::new(HttpActionDispatcher::new(
                base_url,
                config.api_key.clone(),
                std::time::Duration::from_secs(config.timeout_secs.max(1)),
            )?))
        }
        None => {
            tracing::warn!("integrations.base_url is not set; actions will only be logged");
            Ok(Arc::new(LogOnlyExecutor))
        }
    }
}
