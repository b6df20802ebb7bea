//! Retry and dead-letter policy.
//!
//! Pure decision logic: given how many attempts a job has burned and what
//! kind of error the handler returned, decide whether the job retries (and
//! after how long) or is quarantined. The store transitions themselves live
//! in the queue runtime.

use std::time::Duration;

use crate::error::HandlerError;

/// What the failure policy decided for a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Return the job to pending, eligible again after `delay`.
    Retry { delay: Duration },
    /// Quarantine the job; it is never claimed again.
    DeadLetter,
}

/// Exponential-backoff retry policy.
///
/// The delay before attempt `n + 1` is `base_delay * 3^(n - 1)`, where `n`
/// is the number of attempts already made: with the default 60s base the
/// sequence is 60s, 180s, 540s, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Backoff after `attempts` failed attempts (1-indexed).
    pub fn backoff_for_attempt(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        // 3^exponent saturates rather than wrapping for absurd attempt counts.
        let factor = 3u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Decide retry vs. dead-letter for a job that just failed.
    ///
    /// `attempts` already reflects the failed attempt (incremented at claim).
    /// Permanent errors dead-letter immediately; transient ones retry until
    /// the attempt budget is exhausted.
    pub fn decide(&self, attempts: i32, max_attempts: i32, error: &HandlerError) -> FailureAction {
        match error {
            HandlerError::Permanent(_) => FailureAction::DeadLetter,
            HandlerError::Transient(_) => {
                if attempts >= max_attempts {
                    FailureAction::DeadLetter
                } else {
                    FailureAction::Retry {
                        delay: self.backoff_for_attempt(attempts.max(1) as u32),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> HandlerError {
        HandlerError::transient("boom")
    }

    #[test]
    fn default_backoff_sequence_is_60_180_540() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(180));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(540));
    }

    #[test]
    fn retries_until_attempts_exhausted() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(1, 3, &transient()),
            FailureAction::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(2, 3, &transient()),
            FailureAction::Retry { .. }
        ));
        assert_eq!(policy.decide(3, 3, &transient()), FailureAction::DeadLetter);
    }

    #[test]
    fn permanent_errors_skip_remaining_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, 3, &HandlerError::permanent("payload refers to a deleted record")),
            FailureAction::DeadLetter
        );
    }

    #[test]
    fn single_attempt_budget_dead_letters_on_first_failure() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, 1, &transient()), FailureAction::DeadLetter);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: backoff never shrinks as attempts grow.
            #[test]
            fn backoff_is_monotonic(attempt in 1u32..20) {
                let policy = RetryPolicy::default();
                prop_assert!(
                    policy.backoff_for_attempt(attempt + 1) >= policy.backoff_for_attempt(attempt)
                );
            }

            /// Property: the decision respects the attempt budget exactly.
            #[test]
            fn transient_decision_matches_budget(
                attempts in 1i32..50,
                max_attempts in 1i32..50,
            ) {
                let policy = RetryPolicy::default();
                let action = policy.decide(attempts, max_attempts, &HandlerError::transient("x"));
                if attempts >= max_attempts {
                    prop_assert_eq!(action, FailureAction::DeadLetter);
                } else {
                    prop_assert!(matches!(action, FailureAction::Retry { .. }), "expected Retry action");
                }
            }

            /// Property: each retry waits exactly three times the previous one.
            #[test]
            fn backoff_triples(attempt in 1u32..12) {
                let policy = RetryPolicy::new(Duration::from_secs(60));
                let this = policy.backoff_for_attempt(attempt);
                let next = policy.backoff_for_attempt(attempt + 1);
                prop_assert_eq!(next, this * 3);
            }
        }
    }
}
