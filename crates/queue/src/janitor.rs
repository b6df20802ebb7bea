//! Maintenance sweeps: stuck-job recovery and retention.
//!
//! Workers can die mid-execution (crash, OOM-kill, host loss), leaving jobs
//! parked in processing forever. No external coordination exists to notice;
//! the janitor is the required safety net. It runs on its own schedule and
//! only touches rows scoped by status+time predicates, so it cannot
//! conflict with an active claim.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use conveyor_store::{JobStore, StoreError};

use crate::config::QueueConfig;

/// What one janitor pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    /// Processing jobs reset to pending (worker presumed dead).
    pub recovered: u64,
    /// Terminal jobs deleted past the retention window.
    pub purged: u64,
}

/// Run both sweeps against `store` at instant `now`.
///
/// Recovery resets a stuck job without touching `attempts`: the claim that
/// preceded the crash already counted. The job becomes claimable again
/// immediately, trading exactly-once for at-least-once execution.
pub(crate) async fn sweep<S: JobStore>(
    store: &S,
    config: &QueueConfig,
    now: DateTime<Utc>,
) -> Result<JanitorReport, StoreError> {
    let lock_cutoff = now - chrono::Duration::from_std(config.lock_timeout).unwrap_or_default();
    let recovered = store.recover_stuck(lock_cutoff, now).await?;
    if recovered > 0 {
        warn!(recovered, "reclaimed jobs stuck in processing past the lock timeout");
    }

    let retention_cutoff = now - chrono::Duration::from_std(config.retention).unwrap_or_default();
    let purged = store.purge_terminal(retention_cutoff).await?;
    if purged > 0 {
        info!(purged, "purged terminal jobs past the retention window");
    }

    Ok(JanitorReport { recovered, purged })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conveyor_core::{JobStatus, Priority};
    use conveyor_store::{InMemoryJobStore, InsertJob};

    use super::*;

    fn insert_at(scheduled_at: DateTime<Utc>) -> InsertJob {
        InsertJob {
            job_type: "noop".to_string(),
            payload: serde_json::json!({}),
            priority: Priority::Medium,
            max_attempts: 3,
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn recovers_jobs_older_than_lock_timeout() {
        let store = InMemoryJobStore::new();
        let config = QueueConfig::default();
        let now = Utc::now();

        // Claimed 10 minutes ago, lock timeout is 5 minutes.
        let crashed_at = now - chrono::Duration::seconds(600);
        let id = store.insert(insert_at(crashed_at)).await.unwrap();
        store.claim_batch(crashed_at, 10).await.unwrap();

        let report = sweep(&store, &config, now).await.unwrap();
        assert_eq!(report, JanitorReport { recovered: 1, purged: 0 });

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.scheduled_at, now);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn leaves_recent_processing_jobs_alone() {
        let store = InMemoryJobStore::new();
        let config = QueueConfig::default();
        let now = Utc::now();

        let id = store.insert(insert_at(now)).await.unwrap();
        store.claim_batch(now, 10).await.unwrap();

        let report = sweep(&store, &config, now).await.unwrap();
        assert_eq!(report.recovered, 0);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
    }

    #[tokio::test]
    async fn purges_only_beyond_retention() {
        let store = InMemoryJobStore::new();
        let config = QueueConfig::default().with_retention(Duration::from_secs(24 * 60 * 60));
        let now = Utc::now();

        let old = store.insert(insert_at(now)).await.unwrap();
        let recent = store.insert(insert_at(now)).await.unwrap();
        store.claim_batch(now, 10).await.unwrap();
        store
            .mark_completed(old, now - chrono::Duration::days(2))
            .await
            .unwrap();
        store.mark_completed(recent, now).await.unwrap();

        let report = sweep(&store, &config, now).await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(store.get(old).await.unwrap().is_none());
        assert!(store.get(recent).await.unwrap().is_some());
    }
}
