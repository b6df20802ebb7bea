//! Queue notifications (observability hooks).
//!
//! One-way, fire-and-forget events emitted as jobs finish, fail, or are
//! quarantined. Sinks are not part of the transactional contract: a sink
//! must never fail the dispatch path, and delivery is best-effort.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use conveyor_core::JobId;

/// Something observable happened to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Handler finished successfully.
    Completed {
        job_id: JobId,
        job_type: String,
        duration: Duration,
    },
    /// Handler failed; emitted on every failure, whether the job retries
    /// or dead-letters.
    Failed {
        job_id: JobId,
        job_type: String,
        error: String,
        attempts: i32,
    },
    /// The job was quarantined and will never run again.
    DeadLettered {
        job_id: JobId,
        job_type: String,
        error: String,
        attempts: i32,
    },
}

/// Consumer of queue events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: QueueEvent);
}

/// Default sink: structured log records via `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: QueueEvent) {
        match event {
            QueueEvent::Completed {
                job_id,
                job_type,
                duration,
            } => {
                info!(%job_id, %job_type, duration_ms = duration.as_millis() as u64, "job completed");
            }
            QueueEvent::Failed {
                job_id,
                job_type,
                error,
                attempts,
            } => {
                warn!(%job_id, %job_type, %error, attempts, "job failed");
            }
            QueueEvent::DeadLettered {
                job_id,
                job_type,
                error,
                attempts,
            } => {
                warn!(%job_id, %job_type, %error, attempts, "job dead-lettered");
            }
        }
    }
}

/// Collecting sink for tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Mutex<Vec<QueueEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for InMemorySink {
    fn emit(&self, event: QueueEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl<S> EventSink for std::sync::Arc<S>
where
    S: EventSink + ?Sized,
{
    fn emit(&self, event: QueueEvent) {
        (**self).emit(event);
    }
}
