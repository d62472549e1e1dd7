//! Retry with Exponential Backoff
//!
//! Wraps a single provider call so rate-limit and overload failures are
//! retried on an exponential schedule. Every wait is raced against the
//! caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{LlmError, LlmResult};

/// Backoff schedule for retryable provider errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Jitter applied to each delay (0.0 - 1.0)
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            randomization_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms))
    }

    /// Fresh delay schedule; never gives up on its own, `max_retries`
    /// bounds the loop instead.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_delay_ms))
            .with_multiplier(self.multiplier.max(1.0))
            .with_randomization_factor(self.randomization_factor.clamp(0.0, 1.0))
            .with_max_interval(self.max_delay())
            .with_max_elapsed_time(None)
            .build()
    }

    /// Next wait: the schedule's delay, raised to the server's
    /// `retry-after` when that is longer, never beyond `max_delay_ms`.
    fn next_delay(&self, schedule: &mut ExponentialBackoff, err: &LlmError) -> Duration {
        let scheduled = schedule.next_backoff().unwrap_or_else(|| self.max_delay());
        let delay = match err.retry_after_secs() {
            Some(secs) => scheduled.max(Duration::from_secs(secs)),
            None => scheduled,
        };
        delay.min(self.max_delay())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, runs out
/// of retries, or `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    provider: &str,
    mut op: F,
) -> LlmResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let mut schedule = policy.schedule();
    let mut retries = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => {
                if retries > 0 {
                    debug!(provider, retries, "Provider call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || retries >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.next_delay(&mut schedule, &err);
        retries += 1;
        warn!(
            provider,
            attempt = retries,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable provider error, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
