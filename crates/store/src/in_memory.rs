//! In-memory job store for tests/dev.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use conveyor_core::{Job, JobId, JobStatus};

use crate::error::StoreError;
use crate::job_store::{InsertJob, JobCounts, JobStore};

/// Single-process job store backed by a map under a lock.
///
/// Mirrors the two-step claim shape of the Postgres store (candidate
/// selection, then a status-guarded transition) so the concurrency
/// properties can be exercised without a database. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<JobId, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: InsertJob) -> Result<JobId, StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.next_id += 1;
        let id = JobId::from_i64(inner.next_id);

        inner.jobs.insert(
            id,
            Job {
                id,
                job_type: job.job_type,
                payload: job.payload,
                priority: job.priority,
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts: job.max_attempts,
                scheduled_at: job.scheduled_at,
                started_at: None,
                completed_at: None,
                last_error: None,
                created_at: Utc::now(),
            },
        );

        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let mut inner = self.inner.write().unwrap();

        // Candidate selection: eligible jobs by (priority, scheduled_at, id).
        let mut candidates: Vec<(i16, DateTime<Utc>, JobId)> = inner
            .jobs
            .values()
            .filter(|j| j.is_claimable(now))
            .map(|j| (j.priority.as_i16(), j.scheduled_at, j.id))
            .collect();
        candidates.sort();
        candidates.truncate(batch_size);

        // Guarded transition, one candidate at a time. Under this lock the
        // guard cannot lose a race, but keeping it preserves the contract's
        // shape: only a still-pending row may enter processing.
        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, _, id) in candidates {
            if let Some(job) = inner.jobs.get_mut(&id) {
                if job.status != JobStatus::Pending {
                    continue;
                }
                job.status = JobStatus::Processing;
                job.attempts += 1;
                job.started_at = Some(now);
                claimed.push(job.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_completed(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(finished_at);
        job.last_error = None;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: JobId,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Pending;
        job.scheduled_at = scheduled_at;
        job.started_at = None;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn mark_dead_letter(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::DeadLetter;
        job.completed_at = Some(finished_at);
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn recover_stuck(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut recovered = 0u64;

        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.started_at.is_some_and(|s| s < cutoff)
            {
                job.status = JobStatus::Pending;
                job.scheduled_at = now;
                job.started_at = None;
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.jobs.len();

        inner.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|c| c < cutoff))
        });

        Ok((before - inner.jobs.len()) as u64)
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut counts = JobCounts::default();

        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::DeadLetter => counts.dead_letter += 1,
            }
        }

        Ok(counts)
    }
}
