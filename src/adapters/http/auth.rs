//! Credential check for the automation routes.
//!
//! A request passes with `Authorization: Bearer <cron.secret>` or, when
//! `cron.trusted_header` is configured, with that header set to the
//! expected value.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use super::error::ApiError;
use super::server::AppState;
use crate::domain::models::CronConfig;

/// Reject requests that carry neither the cron bearer secret nor the
/// scheduler's trusted header.
pub(super) async fn require_cron_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_authorized(&state.cron, request.headers()) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated automation request");
        ApiError::Unauthorized.into_response()
    }
}

pub(super) fn is_authorized(cron: &CronConfig, headers: &HeaderMap) -> bool {
    let bearer_ok = cron.secret.as_deref().is_some_and(|secret| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| secrets_match(token.trim(), secret))
    });

    let trusted_ok = cron.trusted_header.as_deref().is_some_and(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(&cron.trusted_header_value))
    });

    bearer_ok || trusted_ok
}

/// Compares digests so the time taken depends on neither the content nor
/// the length of the configured secret.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
