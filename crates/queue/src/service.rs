//! The queue service: producer API, dispatch cycle, janitor entry point.
//!
//! One `QueueService` per process, built at the composition root and shared
//! by reference; there is no hidden global instance. Concurrency safety does
//! not depend on that: any number of processes may run
//! [`QueueService::process_queue`] against the same database, and the
//! store's claim transaction keeps them from ever executing the same job
//! twice at once.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use conveyor_core::{
    FailureAction, HandlerError, Job, JobId, NewJob, RetryPolicy, ValidationError, truncate_error,
};
use conveyor_store::{InsertJob, JobCounts, JobStore, StoreError};

use crate::config::QueueConfig;
use crate::events::{EventSink, QueueEvent, TracingSink};
use crate::janitor::{self, JanitorReport};
use crate::registry::{HandlerRegistry, JobHandler};

/// Rejection of an `add_job` call.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The submission failed validation; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The insert itself failed; surfaced loudly to the producer.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one `process_queue` invocation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Claim-and-execute cycles run (> 1 when full batches trigger refills).
    pub cycles: u32,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

enum ExecOutcome {
    Completed,
    Retried,
    DeadLettered,
    /// A store update failed mid-finalize; the job is left for a later
    /// cycle (or the janitor) and nothing else in the batch is affected.
    Aborted,
}

/// Composition root of the queue subsystem.
pub struct QueueService<S: JobStore> {
    store: S,
    registry: HandlerRegistry,
    config: QueueConfig,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
}

impl<S: JobStore> QueueService<S> {
    /// Build the service. The registry must already contain every handler;
    /// jobs of unregistered types are dead-lettered on first claim.
    pub fn new(store: S, registry: HandlerRegistry, config: QueueConfig) -> Self {
        let policy = RetryPolicy::new(config.base_retry_delay);
        Self {
            store,
            registry,
            config,
            policy,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the default tracing sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enqueue one job; returns its assigned id.
    ///
    /// Never blocks on execution. `max_attempts` is stamped from the current
    /// configuration here and not re-read later, so in-flight jobs are
    /// unaffected by configuration changes.
    #[instrument(skip(self, job), fields(job_type = %job.job_type, priority = %job.priority), err)]
    pub async fn add_job(&self, job: NewJob) -> Result<JobId, EnqueueError> {
        job.validate()?;

        let now = Utc::now();
        let id = self
            .store
            .insert(InsertJob {
                scheduled_at: job.scheduled_at(now),
                job_type: job.job_type,
                payload: job.payload,
                priority: job.priority,
                max_attempts: self.config.max_attempts as i32,
            })
            .await?;

        debug!(job_id = %id, "job enqueued");
        Ok(id)
    }

    /// One externally triggered dispatch invocation.
    ///
    /// Claims up to `batch_size` eligible jobs and executes them. When a
    /// full batch was claimed, another cycle runs right after a cooperative
    /// yield, draining backlog faster than the trigger interval would.
    #[instrument(skip(self), err)]
    pub async fn process_queue(&self) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();

        loop {
            report.cycles += 1;
            let batch = self
                .store
                .claim_batch(Utc::now(), self.config.batch_size)
                .await?;
            let batch_len = batch.len();
            report.claimed += batch_len;

            for job in batch {
                match self.execute_one(job).await {
                    ExecOutcome::Completed => report.completed += 1,
                    ExecOutcome::Retried => report.retried += 1,
                    ExecOutcome::DeadLettered => report.dead_lettered += 1,
                    ExecOutcome::Aborted => {}
                }
            }

            if batch_len == 0 || batch_len < self.config.batch_size {
                break;
            }
            // Full batch: more work is likely waiting. Yield, then refill.
            tokio::task::yield_now().await;
        }

        if report.claimed > 0 {
            info!(
                cycles = report.cycles,
                claimed = report.claimed,
                completed = report.completed,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "dispatch finished"
            );
        }
        Ok(report)
    }

    /// Janitor entry point: recover stuck jobs, purge old terminal ones.
    #[instrument(skip(self), err)]
    pub async fn cleanup_dead_jobs(&self) -> Result<JanitorReport, StoreError> {
        janitor::sweep(&self.store, &self.config, Utc::now()).await
    }

    /// Job counts per status; read-only.
    pub async fn get_stats(&self) -> Result<JobCounts, StoreError> {
        self.store.counts().await
    }

    /// Run one claimed job to a terminal or retry state.
    ///
    /// Every path out of here settles the job's status; a job must never be
    /// left in processing by a mere handler failure. Only a store error can
    /// strand it, and then the janitor is the backstop.
    async fn execute_one(&self, job: Job) -> ExecOutcome {
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            "executing job"
        );

        let Some(handler) = self.registry.get(&job.job_type) else {
            // Not transient: no retry can succeed until a deploy registers
            // the handler, so skip the backoff dance entirely.
            let err = HandlerError::permanent(format!(
                "no handler registered for job type '{}'",
                job.job_type
            ));
            warn!(job_id = %job.id, job_type = %job.job_type, "no handler registered");
            return self.settle_failure(&job, &err).await;
        };

        let started = Instant::now();
        let result = run_contained(handler, job.id, job.payload.clone()).await;
        let duration = started.elapsed();

        match result {
            Ok(()) => match self.store.mark_completed(job.id, Utc::now()).await {
                Ok(()) => {
                    self.sink.emit(QueueEvent::Completed {
                        job_id: job.id,
                        job_type: job.job_type,
                        duration,
                    });
                    ExecOutcome::Completed
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to finalize completed job");
                    ExecOutcome::Aborted
                }
            },
            Err(err) => self.settle_failure(&job, &err).await,
        }
    }

    /// Apply the failure policy and persist the resulting transition.
    async fn settle_failure(&self, job: &Job, err: &HandlerError) -> ExecOutcome {
        let error_text = truncate_error(err.message());

        self.sink.emit(QueueEvent::Failed {
            job_id: job.id,
            job_type: job.job_type.clone(),
            error: error_text.clone(),
            attempts: job.attempts,
        });

        match self.policy.decide(job.attempts, job.max_attempts, err) {
            FailureAction::Retry { delay } => {
                let scheduled_at =
                    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
                debug!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    backoff_secs = delay.as_secs(),
                    "scheduling retry"
                );
                match self.store.mark_retry(job.id, scheduled_at, &error_text).await {
                    Ok(()) => ExecOutcome::Retried,
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "failed to schedule retry");
                        ExecOutcome::Aborted
                    }
                }
            }
            FailureAction::DeadLetter => {
                match self
                    .store
                    .mark_dead_letter(job.id, Utc::now(), &error_text)
                    .await
                {
                    Ok(()) => {
                        self.sink.emit(QueueEvent::DeadLettered {
                            job_id: job.id,
                            job_type: job.job_type.clone(),
                            error: error_text,
                            attempts: job.attempts,
                        });
                        ExecOutcome::DeadLettered
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                        ExecOutcome::Aborted
                    }
                }
            }
        }
    }
}

/// Run a handler inside its own task so a panic is contained as a failure
/// instead of tearing down the dispatch loop.
async fn run_contained(
    handler: Arc<dyn JobHandler>,
    job_id: JobId,
    payload: serde_json::Value,
) -> Result<(), HandlerError> {
    let join = tokio::spawn(async move { handler.run(job_id, payload).await });
    match join.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(HandlerError::transient(format!("handler panicked: {e}"))),
        Err(e) => Err(HandlerError::transient(format!("handler task failed: {e}"))),
    }
}
