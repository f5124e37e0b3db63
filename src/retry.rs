//! Exponential backoff for queue calls.
//!
//! Used in two places: the producer retries every send, and the dispatcher
//! backs off between failed receives. Both honour a cancellation token so a
//! shutdown never waits out a sleep.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries (not including the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Producer sends: 5 retries, 500ms doubling.
    pub const SEND: Self = Self {
        max_retries: 5,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry number `attempt` (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Start tracking consecutive failures.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            config: *self,
            failures: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::SEND
    }
}

/// Consecutive-failure tracker for loops that keep going after a failure.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    /// Record a failure. Returns the delay to wait, or `None` once the retry
    /// budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.failures >= self.config.max_retries {
            return None;
        }
        let delay = self.config.delay_for_attempt(self.failures);
        self.failures += 1;
        Some(delay)
    }

    /// Record a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run `operation` until it succeeds, the retries are exhausted, or `cancel`
/// fires. The last error is returned on exhaustion; cancellation yields
/// `Error::Cancelled`.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= config.max_retries {
                    return Err(e);
                }
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    operation = label,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
