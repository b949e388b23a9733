//! Bounded retry with a fixed delay for registry calls.

use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Re-invokes a failing operation a bounded number of times.
///
/// Meant for registry calls that can fail transiently. Deterministic
/// computation (search, training) is never wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// No pause between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Run `operation` until it succeeds or attempts run out; the last error
    /// is returned unchanged. `step` names the operation in log output.
    pub fn with_retry<T, E, F>(&self, step: &str, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        step,
                        attempt,
                        max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "registry call failed, retrying"
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(step, attempt, error = %e, "registry call failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}
