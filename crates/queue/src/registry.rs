//! Handler registry: job type → executable work.
//!
//! Handlers are registered once, before the first dispatch cycle, and the
//! finished registry is handed to the [`crate::QueueService`]. There is no
//! global registration mechanism; the mapping is explicit and statically
//! discoverable at the composition root.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_core::{HandlerError, JobId};

/// Executable work for one job type.
///
/// The handler receives the job's opaque payload and its id (for logging /
/// idempotency keys). Returning [`HandlerError::Transient`] requests a retry
/// with backoff; [`HandlerError::Permanent`] quarantines the job at once.
/// Handlers may block for arbitrarily long; runaway handlers are reclaimed
/// by the janitor once the lock timeout passes.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job_id: JobId, payload: serde_json::Value) -> Result<(), HandlerError>;
}

/// The job type → handler mapping.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `job_type`, replacing any previous one.
    pub fn register(mut self, job_type: impl Into<String>, handler: impl JobHandler + 'static) -> Self {
        self.handlers.insert(job_type.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, for startup logging.
    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl JobHandler for Noop {
        async fn run(&self, _job_id: JobId, _payload: serde_json::Value) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn lookup_finds_registered_handler() {
        let registry = HandlerRegistry::new().register("email.send", Noop);
        assert!(registry.get("email.send").is_some());
        assert!(registry.get("email.receive").is_none());
    }

    #[test]
    fn re_registration_replaces() {
        let registry = HandlerRegistry::new()
            .register("email.send", Noop)
            .register("email.send", Noop);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn job_types_are_sorted() {
        let registry = HandlerRegistry::new()
            .register("pdf.render", Noop)
            .register("email.send", Noop);
        assert_eq!(registry.job_types(), vec!["email.send", "pdf.render"]);
    }
}
