//! Exponential backoff for transient failures.
//!
//! [`with_retry_if`] retries inside one provider call; the translation worker
//! reuses [`RetryConfig::delay_for_attempt`] to space out re-enqueued jobs.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included. Zero behaves like one.
    pub max_attempts: u32,
    /// Wait after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    /// Growth factor applied per further failure
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Three quick attempts for a single HTTP call: waits of 500ms then 1s
    pub fn provider_call() -> Self {
        Self::new(3, Duration::from_millis(500)).with_max_delay(Duration::from_secs(2))
    }

    /// Wait before the next try after `failures` failed attempts.
    ///
    /// Zero failures means no wait; after that the delay starts at
    /// `initial_delay` and grows by `backoff_multiplier`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = (failures - 1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::provider_call()
    }
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or runs out of attempts. The last error is returned.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut failures = 0;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    debug!("{} succeeded after {} failure(s)", operation_name, failures);
                }
                return Ok(value);
            }
            Err(error) => error,
        };
        failures += 1;

        if !should_retry(&error) {
            debug!("{}: not retrying: {}", operation_name, error);
            return Err(error);
        }
        if failures >= max_attempts {
            warn!(
                "{}: giving up after {} attempt(s): {}",
                operation_name, failures, error
            );
            return Err(error);
        }

        let delay = config.delay_for_attempt(failures);
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {:?}",
            operation_name, failures, max_attempts, error, delay
        );
        sleep(delay).await;
    }
}
