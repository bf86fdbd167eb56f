//! The single retry combinator shared by every outbound call.
//!
//! DNS probes, WHOIS queries and the HTTP enrichers all retry through
//! [`RetryPolicy::run`] so that timeout, attempt-count and backoff
//! semantics live in exactly one place.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};

use crate::scan::errors::NetError;

/// Retry parameters for one class of outbound operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Delay before the second attempt.
    pub backoff_base: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Randomization factor in `[0, 1]` applied to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy with exponential backoff starting at `base`.
    pub fn exponential(max_attempts: u32, per_attempt_timeout: Duration, base: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            timeout: per_attempt_timeout,
            backoff_base: base,
            ..Default::default()
        }
    }

    /// Policy with a fixed delay between attempts (WHOIS style).
    pub fn fixed(max_attempts: u32, per_attempt_timeout: Duration, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            timeout: per_attempt_timeout,
            backoff_base: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached. `what` only feeds log lines.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, NetError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetError>>,
    {
        let mut delay = self.backoff_base;
        let mut last_err: Option<NetError> = None;

        for attempt in 1..=self.max_attempts.max(1) {
            match timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_retryable() => {
                    log::debug!("{}: non-retryable failure: {}", what, err);
                    return Err(err);
                }
                Ok(Err(err)) => {
                    log::debug!(
                        "{}: attempt {}/{} failed: {}",
                        what,
                        attempt,
                        self.max_attempts,
                        err
                    );
                    last_err = Some(err);
                }
                Err(_) => {
                    log::debug!(
                        "{}: attempt {}/{} timed out after {:?}",
                        what,
                        attempt,
                        self.max_attempts,
                        self.timeout
                    );
                    last_err = Some(NetError::Timeout(self.timeout.as_secs()));
                }
            }

            if attempt < self.max_attempts {
                sleep(self.jittered(delay)).await;
                delay = delay.mul_f64(self.backoff_multiplier);
            }
        }

        let err = last_err.unwrap_or(NetError::Timeout(self.timeout.as_secs()));
        log::warn!(
            "{}: giving up after {} attempts: {}",
            what,
            self.max_attempts,
            err
        );
        Err(err)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let factor = 1.0
            + rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        delay.mul_f64(factor.max(0.0))
    }
}
