//! `conveyor-queue` — the queue runtime.
//!
//! ## Design
//!
//! - Jobs are typed by an open-ended string key and routed through an
//!   explicit handler registry built once at startup
//! - Claiming is delegated to the store, which guarantees at-most-one
//!   active worker per job across processes
//! - Failures retry with exponential backoff until the attempt budget is
//!   exhausted, then quarantine in dead_letter
//! - The janitor reclaims jobs from crashed workers and purges old
//!   terminal rows
//!
//! ## Components
//!
//! - [`QueueService`]: composition root; owns store, registry, config
//! - [`HandlerRegistry`] / [`JobHandler`]: job type → executable work
//! - [`QueueEvent`] / [`EventSink`]: fire-and-forget observability hooks
//! - [`QueueConfig`]: tuning knobs with production defaults
//!
//! The entry points map one-to-one onto the externally scheduled triggers:
//! `add_job` (producers), `process_queue` (dispatch cycle, e.g. every
//! minute), `cleanup_dead_jobs` (janitor, e.g. daily), `get_stats`
//! (observability).

pub mod config;
pub mod events;
pub mod janitor;
pub mod registry;
pub mod service;


pub use config::QueueConfig;
pub use events::{EventSink, InMemorySink, QueueEvent, TracingSink};
pub use janitor::JanitorReport;
pub use registry::{HandlerRegistry, JobHandler};
pub use service::{DispatchReport, EnqueueError, QueueService};
