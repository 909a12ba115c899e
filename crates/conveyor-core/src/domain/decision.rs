//! What to do after a handler fails.
//!
//! `decide` is a pure function of the policy, the attempt count and the error.
//! Applying the decision (recording state, scheduling redelivery) is the
//! worker loop's job.

use std::time::Duration;

use super::{HandlerError, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Redeliver after `delay`.
    Retry { delay: Duration, reason: String },

    /// Record a terminal failure.
    Fail { reason: String },
}

/// Decide the next step after the `attempt_count`-th invocation failed with `error`.
///
/// Retries while the error is retryable and `attempt_count <= max_retries`, so a
/// handler that always fails is invoked exactly `max_retries + 1` times.
pub fn decide(policy: &RetryPolicy, attempt_count: u32, error: &HandlerError) -> Decision {
    if !policy.is_retryable(error) {
        return Decision::Fail {
            reason: format!("not retryable ({})", error.kind()),
        };
    }
    if attempt_count > policy.max_retries {
        return Decision::Fail {
            reason: format!(
                "retries exhausted: {} attempts, max_retries={}",
                attempt_count, policy.max_retries
            ),
        };
    }
    let delay = policy.backoff.delay(attempt_count);
    Decision::Retry {
        delay,
        reason: format!(
            "retry {}/{} after {:?}",
            attempt_count, policy.max_retries, delay
        ),
    }
}
