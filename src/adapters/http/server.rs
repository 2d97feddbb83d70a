//! Automation HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::auth::require_cron_auth;
use super::error::ApiError;
use crate::domain::models::{CronConfig, DomainEvent, ServerConfig};
use crate::services::{AutomationService, Engine, ProcessOutcome, Promoter, SweepSummary, Worker, WorkerReport};

/// Shared state for the automation routes.
pub(super) struct AppState {
    pub(super) automation: Arc<AutomationService>,
    pub(super) promoter: Arc<Promoter>,
    pub(super) worker: Arc<Worker>,
    pub(super) cron: CronConfig,
    pub(super) drain_batch: usize,
}

/// Build the router over an opened engine.
pub fn build_router(engine: &Engine) -> Router {
    let state = Arc::new(AppState {
        automation: engine.automation.clone(),
        promoter: engine.promoter.clone(),
        worker: engine.worker.clone(),
        cron: engine.config.cron.clone(),
        drain_batch: engine.config.worker.batch_size,
    });

    let protected = Router::new()
        .route("/api/cron/automation", get(run_sweep).post(run_sweep))
        .route("/api/automation/events", post(ingest_event))
        .route("/api/automation/worker/drain", post(drain_worker))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_cron_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct AutomationHttpServer {
    config: ServerConfig,
    router: Router,
}

impl AutomationHttpServer {
    pub fn new(engine: &Engine) -> Self {
        Self {
            config: engine.config.server.clone(),
            router: build_router(engine),
        }
    }

    /// Start the server with a shutdown signal.
    pub async fn serve_with_shutdown<F>(
        self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        tracing::info!("Automation HTTP server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

// Handler functions

async fn health_check() -> &'static str {
    "OK"
}

async fn run_sweep(State(state): State<Arc<AppState>>) -> Json<SweepSummary> {
    let summary = state.promoter.run_sweep(Utc::now()).await;
    Json(summary)
}

async fn ingest_event(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DomainEvent>, JsonRejection>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    let Json(event) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let outcome = state.automation.process_event(event).await?;
    Ok(Json(outcome))
}

async fn drain_worker(State(state): State<Arc<AppState>>) -> Result<Json<WorkerReport>, ApiError> {
    let report = state.worker.run_once(state.drain_batch).await?;
    Ok(Json(report))
}
