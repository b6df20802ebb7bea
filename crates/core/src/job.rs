//! The job entity and its lifecycle enums.

use core::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::JobId;

/// Claim-ordering tier.
///
/// Stored as a small integer so the claim query can order on it directly:
/// lower value claims first. A sustained stream of high-priority jobs can
/// starve lower tiers; that trade-off is accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_i16(&self) -> i16 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn from_i16(value: i16) -> Result<Self, ValidationError> {
        match value {
            0 => Ok(Priority::High),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::Low),
            other => Err(ValidationError::UnknownPriority(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ValidationError::UnknownPriority(other.to_string())),
        }
    }
}

/// Lifecycle state of a job.
///
/// Transitions are monotonic: pending → processing → (completed | dead_letter),
/// with processing → pending allowed for retry and stuck-job recovery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed (possibly not yet eligible).
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Finished successfully; terminal.
    Completed,
    /// Exhausted its attempts (or failed permanently); terminal.
    DeadLetter,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLetter)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::DeadLetter => "dead_letter",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "dead_letter" => Ok(JobStatus::DeadLetter),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted job row.
///
/// The payload is opaque to the queue; only lifecycle fields mutate after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub status: JobStatus,
    /// Incremented on each claim; never exceeds `max_attempts`.
    pub attempts: i32,
    /// Stamped from configuration at enqueue time; in-flight jobs are
    /// unaffected by later configuration changes.
    pub max_attempts: i32,
    /// Earliest instant at which the job may be claimed.
    pub scheduled_at: DateTime<Utc>,
    /// Set when claimed; cleared when the job returns to pending.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
    /// Diagnostic only, truncated to a bounded length.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Whether the job would be picked up by a claim at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.scheduled_at <= now
            && self.attempts < self.max_attempts
    }
}

/// A job submission, before the store assigns an id.
///
/// ```
/// use std::time::Duration;
/// use conveyor_core::{NewJob, Priority};
///
/// let job = NewJob::new("invoice.render", serde_json::json!({"invoice_id": 7}))
///     .with_priority(Priority::High)
///     .with_delay(Duration::from_secs(30));
/// assert!(job.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Delay before the job becomes eligible; zero means immediately.
    pub delay: Duration,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: Priority::default(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Check the submission before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_type.trim().is_empty() {
            return Err(ValidationError::EmptyJobType);
        }
        Ok(())
    }

    /// The instant at which this job becomes eligible, given enqueue time.
    pub fn scheduled_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.delay).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_high_first() {
        assert!(Priority::High.as_i16() < Priority::Medium.as_i16());
        assert!(Priority::Medium.as_i16() < Priority::Low.as_i16());
    }

    #[test]
    fn priority_round_trips_through_str() {
        for p in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
    }

    #[test]
    fn unknown_priority_is_rejected() {
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(ValidationError::UnknownPriority(_))
        ));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::DeadLetter.is_terminal());
    }

    #[test]
    fn empty_job_type_fails_validation() {
        let job = NewJob::new("  ", serde_json::json!({}));
        assert_eq!(job.validate(), Err(ValidationError::EmptyJobType));
    }

    #[test]
    fn delay_offsets_scheduled_at() {
        let now = Utc::now();
        let job = NewJob::new("noop", serde_json::json!({})).with_delay(Duration::from_secs(90));
        assert_eq!(job.scheduled_at(now), now + chrono::Duration::seconds(90));
    }

    #[test]
    fn zero_delay_is_immediately_eligible() {
        let now = Utc::now();
        let job = NewJob::new("noop", serde_json::json!({}));
        assert_eq!(job.scheduled_at(now), now);
    }
}
