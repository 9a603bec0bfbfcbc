//! Bounded retries and request throttling for live queries.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::ModelError;

/// Spacing between benchmark requests.
const BENCHMARK_INTERVAL_MS: u64 = 1000;
/// First retry delay in benchmark mode, doubled per attempt.
const BENCHMARK_BACKOFF_MS: u64 = 2000;
const BENCHMARK_MAX_BACKOFF_MS: u64 = 60_000;

/// When requests may be sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Throttle {
    Unbounded,
    /// Fixed minimum spacing between requests, also used between attempts.
    Fixed(Duration),
    /// Fixed spacing between requests plus an exponential backoff between
    /// attempts. Jitter stays below `base` so delays never shrink.
    Backoff {
        interval: Duration,
        base: Duration,
        max: Duration,
    },
}

impl Throttle {
    pub fn from_config(config: &Config) -> Self {
        if config.benchmark {
            Throttle::Backoff {
                interval: Duration::from_millis(BENCHMARK_INTERVAL_MS),
                base: Duration::from_millis(BENCHMARK_BACKOFF_MS),
                max: Duration::from_millis(BENCHMARK_MAX_BACKOFF_MS),
            }
        } else if config.rate_limit == 0 {
            Throttle::Unbounded
        } else {
            Throttle::Fixed(Duration::from_millis(config.rate_limit))
        }
    }

    /// Minimum spacing between two consecutive requests.
    pub fn interval(&self) -> Duration {
        match *self {
            Throttle::Unbounded => Duration::ZERO,
            Throttle::Fixed(d) => d,
            Throttle::Backoff { interval, .. } => interval,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        match *self {
            Throttle::Unbounded => Duration::ZERO,
            Throttle::Fixed(d) => d,
            Throttle::Backoff { base, max, .. } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                let jitter = Duration::from_millis(fastrand::u64(..base.as_millis().max(1) as u64));
                base.saturating_mul(factor).saturating_add(jitter).min(max)
            }
        }
    }
}

/// Enforces the request spacing of a [`Throttle`] across calls.
#[derive(Debug)]
pub struct RateLimiter {
    throttle: Throttle,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(throttle: Throttle) -> Self {
        Self {
            throttle,
            last_request: Mutex::new(None),
        }
    }

    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Wait until the next request may be sent and mark it as sent.
    pub async fn acquire(&self) {
        let interval = self.throttle.interval();
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready = prev + interval;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Result of [`with_retry`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, retries: u32 },
    Exhausted { attempts: u32, last: ModelError },
    /// A non-transient error ended the loop early.
    Aborted { retries: u32, error: ModelError },
}

/// Run `op` up to `attempts` times, sleeping per `throttle` between attempts.
/// Only transient errors are retried.
pub async fn with_retry<T, F, Fut>(attempts: u32, throttle: Throttle, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    retries: attempt - 1,
                };
            }
            Err(error) if !error.is_transient() => {
                return RetryOutcome::Aborted {
                    retries: attempt - 1,
                    error,
                };
            }
            Err(last) if attempt >= attempts => {
                return RetryOutcome::Exhausted { attempts, last };
            }
            Err(error) => {
                let delay = throttle.retry_delay(attempt);
                tracing::warn!(attempt, attempts, ?delay, %error, "query failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
