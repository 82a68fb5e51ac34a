//! Bounded retries with capped exponential backoff.
//!
//! The caller decides which failures are transient. Anything else is
//! returned immediately, and once the retries run out the last failure is
//! returned unchanged.

use std::fmt;
use std::thread;
use std::time::Duration;

use partedit_config::{
    Config, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_RETRY_MAX_RETRIES,
};
use tracing::{debug, warn};

const RETRY_TARGET: &str = "partedit::retry";

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Builds a policy allowing `max_retries` attempts after the first.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Reads the retry settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retry_max_retries(),
            config.retry_base_delay(),
            config.retry_max_delay(),
        )
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before retry `retry` (0-based): `base * 2^retry`, capped at the
    /// maximum delay.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        2_u32
            .checked_pow(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `operation` until it succeeds, fails permanently, or the retries
    /// are used up.
    ///
    /// # Errors
    ///
    /// Returns the first error for which `is_retryable` is `false`, or the
    /// last error once every attempt has failed.
    pub fn execute<T, E, F, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut retry = 0_u32;
        loop {
            match operation() {
                Ok(value) => {
                    if retry > 0 {
                        debug!(
                            target: RETRY_TARGET,
                            retries = retry,
                            "operation succeeded after retrying"
                        );
                    }
                    return Ok(value);
                }
                Err(error) if retry < self.max_retries && is_retryable(&error) => {
                    let delay = self.delay_for(retry);
                    warn!(
                        target: RETRY_TARGET,
                        attempt = retry + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "transient failure, retrying"
                    );
                    thread::sleep(delay);
                    retry += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
