//! Mandatory randomized pauses between detail fetches.
//!
//! The registry is a shared public service; every detail page costs it a
//! full server-side render. [`Politeness`] bounds our request rate by sleeping
//! a uniformly random interval after each fetched item.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Bounds of the randomized pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Politeness {
    /// Shortest pause.
    pub min_wait: Duration,
    /// Longest pause (inclusive).
    pub max_wait: Duration,
}

impl Politeness {
    /// Create a pause range. Bounds given in the wrong order are swapped.
    pub fn new(min_wait: Duration, max_wait: Duration) -> Self {
        if min_wait <= max_wait {
            Self { min_wait, max_wait }
        } else {
            Self {
                min_wait: max_wait,
                max_wait: min_wait,
            }
        }
    }

    /// Pick a delay uniformly in `[min_wait, max_wait]`.
    pub fn next_delay(&self) -> Duration {
        let min_ms = self.min_wait.as_millis() as u64;
        let max_ms = self.max_wait.as_millis() as u64;
        if min_ms >= max_ms {
            return self.min_wait;
        }
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }

    /// Sleep for one randomized interval.
    ///
    /// Returns `false` if `cancel` fired before the interval elapsed.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tracing::trace!(delay_ms = %delay.as_millis(), "Politeness pause");
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }
}

impl Default for Politeness {
    /// 2–4 seconds between detail pages.
    fn default() -> Self {
        Self {
            min_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(4),
        }
    }
}
