//! Domain error model.

use thiserror::Error;

/// Maximum length of a stored `last_error`, in characters.
///
/// Errors are diagnostic only; anything longer is cut at a char boundary.
pub const MAX_LAST_ERROR_LEN: usize = 500;

/// Rejection of a job before it is ever persisted.
///
/// Keep this focused on deterministic input problems; storage concerns
/// belong to the store layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `job_type` was empty or whitespace-only.
    #[error("job_type must not be empty")]
    EmptyJobType,

    /// Priority string did not name one of the defined tiers.
    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    /// Status string did not name a known lifecycle state.
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    /// Job id failed to parse.
    #[error("invalid job id: {0}")]
    InvalidJobId(String),
}

/// Error returned by a job handler.
///
/// Handlers signal failures with a typed result rather than panicking; the
/// failure policy consumes the kind. Panics that escape a handler anyway are
/// converted to [`HandlerError::Transient`] at the runner boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The work may succeed if retried (network hiccup, upstream 5xx, ...).
    #[error("{0}")]
    Transient(String),

    /// No retry can succeed (malformed payload, deleted target, ...).
    /// Routed straight to dead_letter without burning remaining attempts.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Truncate an error message to [`MAX_LAST_ERROR_LEN`] characters.
pub fn truncate_error(msg: &str) -> String {
    if msg.chars().count() <= MAX_LAST_ERROR_LEN {
        msg.to_string()
    } else {
        msg.chars().take(MAX_LAST_ERROR_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_errors_pass_through() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn long_errors_are_cut_to_bound() {
        let long = "x".repeat(2 * MAX_LAST_ERROR_LEN);
        assert_eq!(truncate_error(&long).chars().count(), MAX_LAST_ERROR_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_LAST_ERROR_LEN + 10);
        let cut = truncate_error(&long);
        assert_eq!(cut.chars().count(), MAX_LAST_ERROR_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
