//! Bounded exponential backoff for outbound requests.
//!
//! The policy only answers "retry?" and "how long to wait?"; callers own the
//! loop so they can hold `&mut` state (the credential manager) across
//! attempts.

use crate::error::SourceError;
use history_sync_config::RetryConfig;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            factor: 1.5,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.factor.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests and dry tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Wait before retry number `retry` (0 for the first retry):
    /// `base_delay * factor^retry`, capped at `max_delay`, plus up to 25%
    /// random jitter when enabled.
    pub fn backoff(&self, retry: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(retry as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
        let mut delay = Duration::from_secs_f64(capped);
        if self.jitter && !delay.is_zero() {
            let spread = (delay.as_millis() as u64 / 4).max(1);
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=spread));
        }
        delay
    }

    /// Backoff for `err`, stretched to the server's `Retry-After` when that
    /// is longer
    pub fn delay_for(&self, err: &SourceError, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        match err {
            SourceError::RateLimited { retry_after: Some(after) } if *after > backoff => *after,
            _ => backoff,
        }
    }

    /// Whether to try again after `attempts_made` failed attempts
    pub fn should_retry(&self, err: &SourceError, attempts_made: u32) -> bool {
        err.is_retryable() && attempts_made < self.max_attempts
    }

    /// Final error once retries are used up; non-retryable errors pass through
    pub fn give_up(&self, err: SourceError, attempts_made: u32) -> SourceError {
        if err.is_retryable() {
            SourceError::FetchFailed {
                attempts: attempts_made,
                last: Box::new(err),
            }
        } else {
            err
        }
    }
}
