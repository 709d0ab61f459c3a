//! Bounded retry policy for language-model calls
//!
//! Every call made through [`RetryPolicy::run`] is wrapped in a per-attempt
//! timeout, and failed attempts are retried with exponential backoff plus
//! jitter until the attempt limit is reached.
//!
//! # Examples
//!
//! ```rust
//! use persona_model::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::with_attempts(3, 100).with_call_timeout(Duration::from_secs(5));
//! assert_eq!(policy.max_attempts, 3);
//! assert!(policy.calculate_retry_delay(1) >= Duration::from_millis(200));
//! ```

use crate::provider::{ModelError, ModelResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry parameters for calls into a model provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff (in milliseconds)
    pub max_delay_ms: u64,
    /// Jitter factor for randomizing retry delays (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Timeout applied to each individual attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter_factor: 0.1,
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom attempt limit and base delay
    pub fn with_attempts(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            ..Default::default()
        }
    }

    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
            ..Default::default()
        }
    }

    /// Set the per-attempt timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Disable jitter, mostly useful for deterministic tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be between 0.0 and 1.0".to_string());
        }
        if self.call_timeout.is_zero() {
            return Err("call_timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Calculate delay for retry attempt with exponential backoff and jitter
    pub fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        let exponential_delay = base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let max_delay = Duration::from_millis(self.max_delay_ms);

        let delay = exponential_delay.min(max_delay);

        if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..=self.jitter_factor);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// limit is reached. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> ModelResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(self.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout {
                    seconds: self.call_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    warn!("{} failed permanently: {}", label, e);
                    return Err(e);
                }
                Err(e) if attempt >= attempts => {
                    warn!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.calculate_retry_delay(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
