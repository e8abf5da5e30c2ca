//! Retry policy with exponential backoff
//!
//! Wraps a single remote call and re-issues it while the failure is transient.
//! Callers decide what is safe to retry: reads and idempotent association writes
//! go through [`RetryPolicy::execute`], company creation drives its own loop.

use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Errors that can tell the retry loop whether another attempt makes sense
pub trait RetryableError {
    fn is_retryable(&self) -> bool;

    /// Server-provided minimum wait before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay to between 50% and 100% of its nominal value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Nominal delay after the given (1-based) failed attempt, before jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.config.base_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.config.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay to wait after `attempt` failed with `error`
    pub fn delay_for<E: RetryableError>(&self, attempt: u32, error: &E) -> Duration {
        let mut delay = self.backoff_delay(attempt);

        if self.config.jitter && !delay.is_zero() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }

        // Retry-After is a floor, still bounded by max_delay
        if let Some(hint) = error.retry_after() {
            delay = delay.max(hint.min(self.config.max_delay));
        }

        delay
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() || attempt >= max_attempts {
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt, &error);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, max_attempts, delay, error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
