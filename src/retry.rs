//! Bounded retry with jittered backoff
//!
//! Concurrent CI jobs push to the same branches, so a retry loop that wakes
//! every job at the same instant just collides again. Each wait adds a random
//! term drawn per process to spread the jobs out.

use crate::error::{Error, Result};
use log::warn;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{Duration, SystemTime};

/// How the deterministic part of the wait grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt²` milliseconds.
    Quadratic,
    /// `attempt` milliseconds, for branches with many concurrent writers.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Upper bound of the random term, in milliseconds.
    pub wait_ms: u64,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn quadratic(max_attempts: u32, wait_ms: u64) -> Self {
        Self {
            max_attempts,
            wait_ms,
            backoff: Backoff::Quadratic,
        }
    }

    pub fn linear(max_attempts: u32, wait_ms: u64) -> Self {
        Self {
            max_attempts,
            wait_ms,
            backoff: Backoff::Linear,
        }
    }

    /// Wait before the attempt following `attempt`, given a jitter in `0..=wait_ms`.
    pub fn delay(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let attempt = u64::from(attempt);
        let base = match self.backoff {
            Backoff::Quadratic => attempt.saturating_mul(attempt),
            Backoff::Linear => attempt,
        };
        Duration::from_millis(base.saturating_add(jitter_ms.min(self.wait_ms)))
    }
}

/// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
///
/// Only errors for which [`Error::is_retryable`] holds are retried. When the
/// last attempt fails, its error is returned inside [`Error::RetryExhausted`].
pub fn retry<T, F>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    retry_with_sleep(policy, std::thread::sleep, operation)
}

/// [`retry`] with an injectable sleep, so tests do not wait.
pub fn retry_with_sleep<T, F, S>(policy: &RetryPolicy, mut sleep: S, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if attempt >= max_attempts {
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay(attempt, random_below(policy.wait_ms.saturating_add(1)));
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A random number in `0..bound` (0 when `bound` is 0).
///
/// `RandomState` is seeded randomly per process, which is all the
/// desynchronization between CI jobs needs.
pub(crate) fn random_below(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(nanos);
    hasher.finish() % bound
}
