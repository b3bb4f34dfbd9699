//! Exponential backoff for transient job failures (§4.3 "Retries").
//!
//! Permanent failures (validation, circuit open) are the caller's job to
//! distinguish — this module only computes delays and classifies whether an
//! attempt count has been exhausted.

use std::time::Duration;

use crate::error::MemoryError;

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);
/// Backoff multiplier applied per attempt.
pub const FACTOR: u32 = 2;
/// Ceiling on any single computed delay, before jitter.
pub const CAP: Duration = Duration::from_secs(60);
/// Maximum number of attempts (the first try plus up to this many retries).
pub const MAX_ATTEMPTS: u32 = 5;
/// Jitter applied symmetrically around the computed delay.
const JITTER_FRACTION: f64 = 0.2;

/// True if `error` should be retried per §4.3 (transient: service
/// unavailable from a non-circuit-open cause, or a storage hiccup).
/// Validation, not-found, conflict, and circuit-open failures are permanent.
pub fn is_retryable(error: &MemoryError) -> bool {
    match error {
        MemoryError::ServiceUnavailable(service_err) => !matches!(
            service_err,
            crate::error::ServiceUnavailableError::CircuitOpen { .. }
        ),
        MemoryError::ResourceUnavailable(_) | MemoryError::Storage(_) | MemoryError::Io(_) => true,
        MemoryError::Validation(_)
        | MemoryError::NotFound(_)
        | MemoryError::Conflict(_)
        | MemoryError::Internal(_) => false,
    }
}

/// Computes the backoff delay before attempt number `attempt` (1-indexed:
/// the value returned before the *second* attempt is `attempt = 1`).
/// `jitter_unit` is a caller-supplied value in `[-1.0, 1.0]` so the result is
/// deterministic in tests; production callers pass a fresh random sample.
pub fn backoff_delay(attempt: u32, jitter_unit: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let raw = BASE_DELAY.saturating_mul(FACTOR.saturating_pow(exponent));
    let capped = raw.min(CAP);
    let jitter = capped.mul_f64(JITTER_FRACTION * jitter_unit.clamp(-1.0, 1.0));
    if jitter_unit >= 0.0 {
        capped.saturating_add(jitter)
    } else {
        capped.saturating_sub(jitter.min(capped))
    }
}

/// True if `attempt` (1-indexed count of attempts made so far) has used up
/// the retry budget and must not be retried again.
pub fn attempts_exhausted(attempt: u32) -> bool {
    attempt >= MAX_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceUnavailableError, ValidationError};

    #[test]
    fn service_unavailable_is_retryable_unless_circuit_open() {
        let transient: MemoryError = ServiceUnavailableError::Embedding("timeout".into()).into();
        assert!(is_retryable(&transient));

        let circuit: MemoryError = ServiceUnavailableError::circuit_open("embedding").into();
        assert!(!is_retryable(&circuit));
    }

    #[test]
    fn validation_is_never_retryable() {
        let err: MemoryError = ValidationError::required_field("content").into();
        assert!(!is_retryable(&err));
    }

    #[test]
    fn backoff_grows_exponentially_before_cap() {
        let first = backoff_delay(1, 0.0);
        let second = backoff_delay(2, 0.0);
        let third = backoff_delay(3, 0.0);
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(2));
        assert_eq!(third, Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped_at_sixty_seconds() {
        let delay = backoff_delay(10, 0.0);
        assert_eq!(delay, CAP);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let base = backoff_delay(3, 0.0);
        let high = backoff_delay(3, 1.0);
        let low = backoff_delay(3, -1.0);
        assert!(high > base);
        assert!(low < base);
        let spread = high.as_secs_f64() - base.as_secs_f64();
        assert!(spread <= base.as_secs_f64() * JITTER_FRACTION + f64::EPSILON);
    }

    #[test]
    fn max_five_attempts() {
        assert!(!attempts_exhausted(4));
        assert!(attempts_exhausted(5));
    }
}
