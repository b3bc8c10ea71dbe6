//! Bounded re-assembly with fresh random choices.
//!
//! Recoverable failures (coverage, constraint violations) get a new attempt
//! with a new seed. Population failures first get one strict-anchoring retry
//! on the same structure. Everything else fails immediately.

use crate::error::Error;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Retry a failed relaxed population once with strict anchoring.
    pub strict_fallback: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            strict_fallback: true,
        }
    }
}

impl RetryPolicy {
    /// Seed for a given attempt (0-indexed). Attempt 0 uses `base` itself so
    /// a reported seed reproduces the run.
    pub fn seed_for_attempt(base: u64, attempt: u32) -> u64 {
        // splitmix64 increment; distinct attempts land far apart.
        base ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Whether `error` on the 0-indexed `attempt` warrants another attempt.
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && (error.is_recoverable() || error.is_population_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_keeps_base_seed() {
        assert_eq!(RetryPolicy::seed_for_attempt(42, 0), 42);
        assert_ne!(RetryPolicy::seed_for_attempt(42, 1), 42);
        assert_ne!(
            RetryPolicy::seed_for_attempt(42, 1),
            RetryPolicy::seed_for_attempt(42, 2)
        );
    }

    #[test]
    fn retries_only_recoverable_errors_within_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let coverage = Error::CoverageUnsatisfiable("x".into());
        assert!(policy.should_retry(&coverage, 0));
        assert!(policy.should_retry(&coverage, 1));
        assert!(!policy.should_retry(&coverage, 2));
        assert!(policy.should_retry(&Error::VerbatimLoss(vec!["a".into()]), 0));
        assert!(!policy.should_retry(&Error::StructureUnsatisfiable("x".into()), 0));
        assert!(!policy.should_retry(&Error::InvalidRequest("x".into()), 0));
    }

    #[test]
    fn single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            strict_fallback: true,
        };
        assert!(!policy.should_retry(&Error::CoverageUnsatisfiable("x".into()), 0));
    }
}
