//! Fixed-delay retry loop with an attempt ceiling

use std::fmt::Display;
use std::time::Duration;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Treated as at least 1.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

/// Run `attempt_fn` until it succeeds or `policy.max_attempts` is reached.
///
/// `attempt_fn` receives the 1-based attempt number. After every failed
/// attempt that will be retried, `before_retry` sees the error and the
/// loop sleeps for `policy.delay`. No sleep follows the final attempt.
///
/// Returns the first success, or the last error on exhaustion.
pub fn retry_with_delay<T, E: Display>(
    label: &str,
    policy: &RetryPolicy,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
    mut before_retry: impl FnMut(&E),
) -> Result<T, E> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match attempt_fn(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts => {
                log::warn!("{label}: attempt {attempt}/{max_attempts} failed: {e}");
                before_retry(&e);
                log::info!("{label}: retrying in {:?}", policy.delay);
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                log::error!("{label}: attempt {attempt}/{max_attempts} failed, giving up: {e}");
                return Err(e);
            }
        }
    }
}
