//! Queue consumer: claims pending entries, executes them and records the
//! terminal outcome on the owning rule.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FailureOutcome, QueueEntry, WorkerConfig};
use crate::domain::ports::{ActionExecutor, QueueRepository, RuleRepository};

/// Outcome of executing one claimed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Completed,
    Retrying { attempts: u32 },
    Failed { attempts: u32 },
    /// The entry left `processing` before it could be finalized.
    Lost,
}

/// Totals for one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub claimed: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl WorkerReport {
    fn record(&mut self, outcome: &DomainResult<EntryOutcome>) {
        match outcome {
            Ok(EntryOutcome::Completed) => self.completed += 1,
            Ok(EntryOutcome::Retrying { .. }) => self.retried += 1,
            Ok(EntryOutcome::Failed { .. }) => self.failed += 1,
            Ok(EntryOutcome::Lost) => {}
            Err(e) => self.errors.push(e.to_string()),
        }
    }
}

pub struct Worker {
    queue: Arc<dyn QueueRepository>,
    rules: Arc<dyn RuleRepository>,
    executor: Arc<dyn ActionExecutor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        rules: Arc<dyn RuleRepository>,
        executor: Arc<dyn ActionExecutor>,
        config: WorkerConfig,
    ) -> Self {
        Self { queue, rules, executor, config }
    }

    /// Claim `id` if it is still pending.
    pub async fn claim(&self, id: Uuid) -> DomainResult<Option<QueueEntry>> {
        self.queue.claim(id, Utc::now()).await
    }

    /// Claim the oldest pending entry, skipping candidates other workers win.
    pub async fn claim_next(&self) -> DomainResult<Option<QueueEntry>> {
        let candidates = self.queue.claimable_ids(self.batch_size()).await?;
        for id in candidates {
            if let Some(entry) = self.claim(id).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Execute a claimed entry and finalize it.
    pub async fn process(&self, entry: QueueEntry) -> DomainResult<EntryOutcome> {
        debug!(entry_id = %entry.id, action_type = %entry.action_type, attempt = entry.attempts + 1, "Executing action");

        match self.executor.execute(&entry).await {
            Ok(receipt) => {
                let now = Utc::now();
                if !self.queue.complete(entry.id, now).await? {
                    warn!(entry_id = %entry.id, "Entry left processing before completion was recorded");
                    return Ok(EntryOutcome::Lost);
                }
                self.record_stats(entry.rule_id, now, true).await;
                info!(
                    entry_id = %entry.id,
                    rule_id = %entry.rule_id,
                    action_type = %entry.action_type,
                    external_id = receipt.external_id.as_deref().unwrap_or(""),
                    "Action completed"
                );
                Ok(EntryOutcome::Completed)
            }
            Err(exec_err) => {
                let now = Utc::now();
                let finalized = if exec_err.retryable {
                    self.queue.fail_attempt(entry.id, &exec_err.message, now).await
                } else {
                    self.queue.fail_permanently(entry.id, &exec_err.message, now).await
                };
                let outcome = match finalized {
                    Ok(outcome) => outcome,
                    Err(DomainError::InvalidStateTransition { .. }) => {
                        warn!(entry_id = %entry.id, "Entry left processing before the failure was recorded");
                        return Ok(EntryOutcome::Lost);
                    }
                    Err(e) => return Err(e),
                };

                match outcome {
                    FailureOutcome::Retrying { attempts } => {
                        warn!(
                            entry_id = %entry.id,
                            attempts,
                            max_attempts = entry.max_attempts,
                            retryable = exec_err.retryable,
                            error = %exec_err,
                            "Action failed, will retry"
                        );
                        Ok(EntryOutcome::Retrying { attempts })
                    }
                    FailureOutcome::Failed { attempts } => {
                        self.record_stats(entry.rule_id, now, false).await;
                        error!(
                            entry_id = %entry.id,
                            rule_id = %entry.rule_id,
                            attempts,
                            error = %exec_err,
                            "Action failed permanently"
                        );
                        Ok(EntryOutcome::Failed { attempts })
                    }
                }
            }
        }
    }

    /// Stats are best effort; the rule may have been deleted since enqueue.
    async fn record_stats(&self, rule_id: Uuid, at: DateTime<Utc>, success: bool) {
        let result = if success {
            self.rules.record_success(rule_id, at).await
        } else {
            self.rules.record_failure(rule_id, at).await
        };
        if let Err(e) = result {
            warn!(rule_id = %rule_id, error = %e, "Failed to update rule execution stats");
        }
    }

    /// Claim up to `batch` entries and execute them with bounded concurrency.
    pub async fn run_once(&self, batch: usize) -> DomainResult<WorkerReport> {
        let mut report = WorkerReport::default();
        let limit = i64::try_from(batch).unwrap_or(i64::MAX);
        let candidates = self.queue.claimable_ids(limit).await?;

        // Entries claimed before a claim error are still processing and
        // must be executed here; nothing else will pick them up again.
        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.claim(id).await {
                Ok(Some(entry)) => claimed.push(entry),
                Ok(None) => {}
                Err(e) if claimed.is_empty() => return Err(e),
                Err(e) => {
                    warn!(entry_id = %id, error = %e, claimed = claimed.len(), "Claim failed, draining what was claimed");
                    break;
                }
            }
        }
        report.claimed = claimed.len() as u64;

        let outcomes: Vec<DomainResult<EntryOutcome>> = stream::iter(claimed)
            .map(|entry| self.process(entry))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for outcome in &outcomes {
            if let Err(e) = outcome {
                error!(error = %e, "Failed to finalize queue entry");
            }
            report.record(outcome);
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                "Worker drain finished"
            );
        }
        Ok(report)
    }

    /// Drain repeatedly until `shutdown` flips to true, sleeping between
    /// empty polls. A drain in progress always finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = StdDuration::from_millis(self.config.poll_interval_ms.max(10));
        info!(
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Worker started"
        );

        while !*shutdown.borrow() {
            let claimed = match self.run_once(self.config.batch_size).await {
                Ok(report) => report.claimed,
                Err(e) => {
                    error!(error = %e, "Worker drain failed");
                    0
                }
            };

            if claimed == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    fn batch_size(&self) -> i64 {
        i64::try_from(self.config.batch_size.max(1)).unwrap_or(i64::MAX)
    }
}
