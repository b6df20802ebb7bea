//! Postgres-backed job store.
//!
//! ## Claim strategy
//!
//! The claim runs in one transaction and is deliberately belt-and-suspenders:
//!
//! 1. A locking candidate select (`FOR UPDATE SKIP LOCKED`) that never waits
//!    on rows another worker's transaction is already claiming.
//! 2. A conditional update per candidate, guarded by `status = 'pending'`,
//!    that transitions the row to processing and increments `attempts`.
//!
//! The locking read alone is sufficient on Postgres; the guarded update keeps
//! the at-most-one-claim guarantee intact on engines without such locking and
//! under read-committed isolation where a lock can be lost between the two
//! steps. A candidate whose guard matches zero rows was claimed by another
//! worker and is skipped silently.
//!
//! ## Error mapping
//!
//! SQLx errors are funneled through `map_sqlx_error`, which tags the failing
//! operation. Rows that cannot be decoded (unknown status or priority text)
//! surface as `StoreError::CorruptRow`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Row};
use tracing::instrument;

use conveyor_core::{Job, JobId, JobStatus, Priority};

use crate::error::{StoreError, map_sqlx_error};
use crate::job_store::{InsertJob, JobCounts, JobStore};

const JOB_COLUMNS: &str = "id, job_type, payload, priority, status, attempts, max_attempts, \
     scheduled_at, started_at, completed_at, last_error, created_at";

/// Durable job store on a PostgreSQL pool.
///
/// Safe to share across tasks and processes; all claim coordination happens
/// in the database, never in process memory.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_type = %job.job_type, priority = %job.priority), err)]
    async fn insert(&self, job: InsertJob) -> Result<JobId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (job_type, payload, priority, status, attempts, max_attempts, scheduled_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.priority.as_i16())
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;

        Ok(JobId::from_i64(id))
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(decode_job).transpose()
    }

    #[instrument(skip(self), fields(claimed = tracing::field::Empty), err)]
    async fn claim_batch(
        &self,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("claim_begin", e))?;

        // Step 1: locking candidate select. SKIP LOCKED keeps concurrent
        // workers from queueing behind each other's claims.
        let candidate_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM jobs
            WHERE status = 'pending'
              AND scheduled_at <= $1
              AND attempts < max_attempts
            ORDER BY priority ASC, scheduled_at ASC, id ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(batch_size as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim_select", e))?;

        // Step 2: guarded transition. Zero rows affected means another
        // worker won the race; skip without error.
        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for candidate in candidate_ids {
            let row = sqlx::query(&format!(
                r#"
                UPDATE jobs
                SET status = 'processing', attempts = attempts + 1, started_at = $2
                WHERE id = $1 AND status = 'pending'
                RETURNING {JOB_COLUMNS}
                "#
            ))
            .bind(candidate)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("claim_update", e))?;

            if let Some(row) = row {
                claimed.push(decode_job(row)?);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("claim_commit", e))?;

        tracing::Span::current().record("claimed", claimed.len());
        Ok(claimed)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn mark_completed(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = $2, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(finished_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_completed", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %id), err)]
    async fn mark_retry(
        &self,
        id: JobId,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', scheduled_at = $2, started_at = NULL, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(scheduled_at)
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_retry", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, error), fields(job_id = %id), err)]
    async fn mark_dead_letter(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead_letter', completed_at = $2, last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(finished_at)
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_dead_letter", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn recover_stuck(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', scheduled_at = $2, started_at = NULL
            WHERE status = 'processing' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recover_stuck", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn purge_terminal(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'dead_letter') AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("purge_terminal", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("counts", e))?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
            let count = count.max(0) as u64;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => counts.pending = count,
                Ok(JobStatus::Processing) => counts.processing = count,
                Ok(JobStatus::Completed) => counts.completed = count,
                Ok(JobStatus::DeadLetter) => counts.dead_letter = count,
                Err(e) => return Err(StoreError::CorruptRow(e.to_string())),
            }
        }

        Ok(counts)
    }
}

// SQLx row type

#[derive(Debug)]
struct JobRow {
    id: i64,
    job_type: String,
    payload: serde_json::Value,
    priority: i16,
    status: String,
    attempts: i32,
    max_attempts: i32,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            payload: row.try_get("payload")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::from_i64(row.id),
            job_type: row.job_type,
            payload: row.payload,
            priority: Priority::from_i16(row.priority)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            status: row
                .status
                .parse::<JobStatus>()
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

fn decode_job(row: PgRow) -> Result<Job, StoreError> {
    JobRow::from_row(&row)
        .map_err(|e| StoreError::CorruptRow(e.to_string()))?
        .try_into()
}
