//! Repository port for the automation queue.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EnqueueOutcome, FailureOutcome, QueueEntry, QueueStatus};

/// Filters for listing queue entries
#[derive(Default, Debug, Clone)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub rule_id: Option<Uuid>,
    pub location_id: Option<String>,
    pub limit: Option<i64>,
}

/// Persistence for queue entries.
///
/// Every state change is a conditional update keyed on the expected prior
/// status; this is the only coordination primitive between producers,
/// the promoter and workers.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Non-terminal entry with `action_hash` created at or after `since`.
    async fn find_active_duplicate(
        &self,
        action_hash: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<QueueEntry>>;

    /// Insert `entry` as the holder of its action hash's dedup slot.
    ///
    /// Non-terminal holders created before `window_start` give up the slot
    /// first. If another entry still holds it (including one inserted by a
    /// concurrent caller), nothing is written and `Duplicate` is returned.
    async fn enqueue(
        &self,
        entry: &QueueEntry,
        window_start: DateTime<Utc>,
    ) -> DomainResult<EnqueueOutcome>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<QueueEntry>>;

    async fn list(&self, filter: QueueFilter) -> DomainResult<Vec<QueueEntry>>;

    async fn count_by_status(&self) -> DomainResult<HashMap<QueueStatus, u64>>;

    /// `scheduled -> pending` for every due entry with attempts left.
    async fn promote_due(&self, now: DateTime<Utc>) -> DomainResult<u64>;

    /// Oldest pending entry ids, candidates for claiming.
    async fn claimable_ids(&self, limit: i64) -> DomainResult<Vec<Uuid>>;

    /// `pending -> processing` for exactly this entry; `None` if another
    /// claimant got there first or it is no longer pending.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<Option<QueueEntry>>;

    /// `processing -> completed`. Returns false if the entry was not processing.
    async fn complete(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool>;

    /// Record a failed attempt: back to pending, or failed when exhausted.
    async fn fail_attempt(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome>;

    /// Record a failed attempt that must not be retried: always `failed`.
    async fn fail_permanently(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome>;
}
