//! Retry/rate-limit discipline shared by every adapter (spec §4.1).
//!
//! Generalized once here rather than duplicated per vendor connector —
//! the teacher's individual SIEM connectors each inline their own
//! request path with no shared backoff; we factor that out into a
//! reusable wrapper, the way the teacher's resilience crate wraps
//! failover/health concerns once for every caller.

use crate::error::AdapterError;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Retries a fallible async operation with exponential backoff,
/// doubling the delay starting at `initial_delay`, up to `max_attempts`
/// total attempts. Only retries when the error is classified retryable.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify,
{
    let mut delay = initial_delay;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                tracing::warn!(attempt, ?delay, "retrying after retryable error");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

pub trait RetryClassify {
    fn is_retryable(&self) -> bool;
}

impl RetryClassify for AdapterError {
    fn is_retryable(&self) -> bool {
        AdapterError::is_retryable(self)
    }
}

/// Per-operation-key minimum-interval rate limiter. The first call for a
/// key returns immediately; subsequent calls within `min_interval` block
/// for the remainder (spec §4.1, P7).
#[derive(Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Arc<DashMap<String, Arc<Mutex<Instant>>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Arc::new(DashMap::new()),
        }
    }

    /// Block the caller, if needed, until `min_interval` has elapsed
    /// since the last call with this key, then record this call's time.
    pub async fn acquire(&self, key: &str) {
        let slot = self
            .last_call
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Instant::now() - self.min_interval)))
            .clone();
        let mut last = slot.lock().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        *last = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AdapterError> = retry_with_backoff(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::ConnectionTimeout) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_ok() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, AdapterError> = retry_with_backoff(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AdapterError> = retry_with_backoff(5, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::AuthenticationFailed("no".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_gap() {
        // P7: two back-to-back calls with key k observe a gap >= m - eps.
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire("k").await;
        limiter.acquire("k").await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn rate_limiter_first_call_does_not_block() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();
        limiter.acquire("fresh-key").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn rate_limiter_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        limiter.acquire("a").await;
        let start = Instant::now();
        limiter.acquire("b").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
