//! Retry with exponential backoff and a keyed sliding-window rate limiter
//!
//! Neither is wired into the gateway client. Callers pick their own policy:
//! a UI may want zero retries, a batch job the default three attempts.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::Instant;

use crate::error::{ClientError, Result};

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

pub const DEFAULT_RATE_LIMIT_REQUESTS: usize = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(60_000);

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Factors below 1 (and NaN) are treated as 1
    fn factor(&self) -> f64 {
        self.backoff_factor.max(1.0).min(f32::MAX as f64)
    }

    /// Sleep after failed attempt `attempt` (1-based): `base * factor^(attempt-1)`
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.factor().powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Exponential schedule without jitter or delay cap
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(Duration::MAX)
            .with_factor(self.factor() as f32)
            .with_max_times(self.max_attempts.max(1) as usize - 1)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is exhausted
///
/// The error returned after the last attempt is the operation's own error.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    retry_if(policy, op, |_: &E| true).await
}

/// Like [`retry`], but gives up immediately when `should_retry` returns false
pub async fn retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    op: F,
    should_retry: P,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    op.retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(should_retry)
        .notify(|err: &E, delay: Duration| {
            attempt += 1;
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );
        })
        .await
}

/// Sliding-window rate limiter keyed by caller-supplied strings
///
/// A request is allowed when fewer than `max_requests` earlier allowed
/// requests for the same key are younger than `window`. Denied requests are
/// not recorded.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drop keys whose requests have all aged out
    fn sweep(requests: &mut HashMap<String, VecDeque<Instant>>, now: Instant, window: Duration) {
        requests.retain(|_, timestamps| {
            Self::prune(timestamps, now, window);
            !timestamps.is_empty()
        });
    }

    /// Record a request for `key` if the window allows it
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.lock();
        if !requests.contains_key(key) {
            Self::sweep(&mut requests, now, self.window);
        }
        let timestamps = requests.entry(key.to_string()).or_default();

        Self::prune(timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            tracing::debug!(key, limit = self.max_requests, "Rate limit reached");
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// [`RateLimiter::check`] as a `Result`, for callers that reject outright
    pub fn enforce(&self, key: &str) -> Result<()> {
        if self.check(key) {
            Ok(())
        } else {
            Err(ClientError::RateLimited {
                key: key.to_string(),
            })
        }
    }

    /// Requests still available for `key` in the current window
    pub fn remaining(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut requests = self.lock();
        match requests.get_mut(key) {
            Some(timestamps) => {
                Self::prune(timestamps, now, self.window);
                let used = timestamps.len();
                if used == 0 {
                    requests.remove(key);
                }
                self.max_requests.saturating_sub(used)
            }
            None => self.max_requests,
        }
    }

    /// Number of keys with requests inside the current window
    pub fn tracked_keys(&self) -> usize {
        let mut requests = self.lock();
        Self::sweep(&mut requests, Instant::now(), self.window);
        requests.len()
    }

    /// Forget all requests recorded for `key`
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }
}
