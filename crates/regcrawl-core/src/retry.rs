//! Bounded retry for flaky UI operations.
//!
//! The registry's search form frequently rejects the first interaction
//! (stale elements, slow script initialisation). [`RetryPolicy::run`] re-runs
//! a whole operation from scratch a bounded number of times and hands the
//! caller an explicit [`RetryExhausted`] value instead of an error it must
//! remember to catch.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::error::AppError;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every failed attempt.
    Fixed(Duration),
    /// `step * attempt` after the n-th failed attempt (1-indexed).
    Linear(Duration),
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    ///
    /// Non-decreasing in `attempt` for every variant.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear(step) => step.saturating_mul(attempt.max(1)),
        }
    }
}

/// Retry configuration: attempt bound plus backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// 3 attempts, 3 seconds apart: what the search form usually needs.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(3)),
        }
    }
}

/// All attempts failed. Carries the error of the final attempt.
#[derive(Debug, Error)]
#[error("{label} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub label: String,
    pub attempts: u32,
    pub last_error: AppError,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    /// Linear-backoff policy.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, Backoff::Linear(step))
    }

    /// Run `op` until it succeeds or `max_attempts` is reached (at least once).
    ///
    /// `op` receives the 1-indexed attempt number. No delay follows the final
    /// attempt. Failed attempts are logged at `warn`. An error that is not
    /// [transient](AppError::is_transient) ends the loop at once.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(%label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(
                        %label,
                        attempt,
                        max_attempts,
                        error = %error,
                        "Attempt failed"
                    );
                    if attempt >= max_attempts || !error.is_transient() {
                        return Err(RetryExhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                    let delay = self.backoff.delay_for_attempt(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
