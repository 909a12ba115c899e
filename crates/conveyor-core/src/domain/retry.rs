//! Retry policy: which failures are retried, how often, and how long to wait.

use std::time::Duration;

use super::{ErrorKind, HandlerError};

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Redeliver immediately.
    Immediate,

    /// Same delay before every retry.
    Fixed(Duration),

    /// `base * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Exponential backoff starting at 1s, doubling, capped at 10 minutes.
    pub fn exponential() -> Self {
        Backoff::Exponential {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(600),
        }
    }

    /// Delay before the retry that follows the `attempt`-th failure (1-indexed).
    ///
    /// Example with the defaults of [`Backoff::exponential`]:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 3: 4s
    /// - attempt 11 and later: 600s
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

/// Per-task retry policy. Data consumed by the worker loop, never woven into
/// handler code.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Error kinds that are retried. Everything else fails immediately.
    pub retry_on: Vec<ErrorKind>,

    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn never() -> Self {
        Self {
            retry_on: Vec::new(),
            max_retries: 0,
            backoff: Backoff::Immediate,
        }
    }

    /// Retry `Transient` errors up to `max_retries` times with exponential backoff.
    pub fn transient(max_retries: u32) -> Self {
        Self {
            retry_on: vec![ErrorKind::Transient],
            max_retries,
            backoff: Backoff::exponential(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// The retryable-error predicate.
    pub fn is_retryable(&self, error: &HandlerError) -> bool {
        self.retry_on.contains(&error.kind())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::never()
    }
}
