//! `conveyor-store` — persistence for the job queue.
//!
//! The job table is the single source of truth for queue state and the only
//! shared mutable resource between worker processes. Two implementations of
//! the [`JobStore`] contract are provided:
//!
//! - [`InMemoryJobStore`]: tests and development, no I/O
//! - [`PostgresJobStore`]: production, claim atomicity via
//!   `FOR UPDATE SKIP LOCKED` plus a guarded conditional update

pub mod error;
pub mod in_memory;
pub mod job_store;
pub mod postgres;

pub use error::StoreError;
pub use in_memory::InMemoryJobStore;
pub use job_store::{InsertJob, JobCounts, JobStore};
pub use postgres::PostgresJobStore;
