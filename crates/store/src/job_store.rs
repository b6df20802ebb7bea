//! The job store contract.
//!
//! All queue state lives in one table of job rows; every mutation goes
//! through this trait. The claim operation is the concurrency-critical one:
//! it must guarantee that no two concurrent callers (in this process or any
//! other) receive the same job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use conveyor_core::{Job, JobId, Priority};

use crate::error::StoreError;

/// A row to insert, with everything the producer layer already resolved:
/// `scheduled_at` computed from the enqueue delay and `max_attempts` stamped
/// from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
}

/// Job counts per status, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub dead_letter: u64,
}

/// Persistence contract for the queue.
///
/// Implementations must uphold:
///
/// - **Claim atomicity**: for any job, at most one `claim_batch` caller ever
///   receives it while it is pending. Lost races are skipped silently.
/// - **Claim ordering**: eligible jobs are returned by priority tier (high
///   first), then ascending `scheduled_at`.
/// - **Monotonic attempts**: only `claim_batch` increments `attempts`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and return its assigned id.
    async fn insert(&self, job: InsertJob) -> Result<JobId, StoreError>;

    /// Fetch a job by id (read-only; inspection and tests).
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Atomically claim up to `batch_size` eligible jobs for the caller.
    ///
    /// A job is eligible when it is pending, `scheduled_at <= now`, and it
    /// has attempts left. Claimed jobs are returned already transitioned to
    /// processing, with `attempts` incremented and `started_at = now`.
    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Terminal success: set completed, stamp `completed_at`, clear the error.
    async fn mark_completed(&self, id: JobId, finished_at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Return a failed job to pending, eligible again at `scheduled_at`.
    /// Does not touch `attempts` (the claim already counted this attempt).
    async fn mark_retry(
        &self,
        id: JobId,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Terminal failure: quarantine the job with its final error.
    async fn mark_dead_letter(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError>;

    /// Reset processing jobs whose `started_at` is before `cutoff` back to
    /// pending (worker presumed dead). Attempts are left untouched.
    /// Returns the number of recovered jobs.
    async fn recover_stuck(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete terminal jobs whose `completed_at` is before `cutoff`.
    /// Returns the number of purged jobs.
    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Count jobs grouped by status.
    async fn counts(&self) -> Result<JobCounts, StoreError>;
}

#[async_trait]
impl<S> JobStore for std::sync::Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn insert(&self, job: InsertJob) -> Result<JobId, StoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).get(id).await
    }

    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Job>, StoreError> {
        (**self).claim_batch(now, batch_size).await
    }

    async fn mark_completed(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).mark_completed(id, finished_at).await
    }

    async fn mark_retry(
        &self,
        id: JobId,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        (**self).mark_retry(id, scheduled_at, error).await
    }

    async fn mark_dead_letter(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        (**self).mark_dead_letter(id, finished_at, error).await
    }

    async fn recover_stuck(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        (**self).recover_stuck(cutoff, now).await
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        (**self).purge_terminal(cutoff).await
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        (**self).counts().await
    }
}
