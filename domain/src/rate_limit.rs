//! Per-credential token bucket throttling for outbound ASR requests.
//!
//! Every submit and query call acquires one token from the bucket keyed by the
//! application id before it is dispatched. Buckets refill continuously at
//! `limit_per_second` and hold at most `burst` tokens.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{config_error, external_error, Error, ExternalErrorKind};

/// Rate limit quota scoped to a single credential key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit_per_second: u32,
    pub burst: u32,
}

impl Quota {
    pub fn per_second(limit_per_second: u32, burst: u32) -> Self {
        Self {
            limit_per_second,
            burst,
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst.max(1))
    }

    fn rate(&self) -> f64 {
        f64::from(self.limit_per_second)
    }
}

/// Anything able to gate a call on a per-key quota.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Wait until one call for `key` may proceed under `quota`.
    async fn acquire(&self, key: &str, quota: Quota) -> Result<(), Error>;
}

/// Token bucket state for one key.
#[derive(Debug)]
pub(crate) struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// A bucket starts full.
    pub(crate) fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.capacity(),
            last_refill: now,
        }
    }

    fn refill(&mut self, quota: Quota, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * quota.rate()).min(quota.capacity());
        self.last_refill = now;
    }

    /// Takes a token if one is available at `now`, otherwise returns how long
    /// until the next token is due.
    pub(crate) fn try_take(&mut self, quota: Quota, now: Instant) -> Result<(), Duration> {
        self.refill(quota, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / quota.rate()))
        }
    }
}

/// In-memory token bucket limiter holding one bucket per key.
///
/// The limiter is meant to be created once and shared (behind an `Arc`) by every
/// component that talks to the same remote service.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
    max_wait: Option<Duration>,
}

impl TokenBucketLimiter {
    /// A limiter whose callers wait as long as needed for a token.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            max_wait: None,
        }
    }

    /// Fail with `RateLimited` instead of waiting longer than `max_wait` in total.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    fn bucket(&self, key: &str, quota: Quota) -> Arc<Mutex<Bucket>> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(quota, Instant::now()))))
            .clone()
    }
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Throttle for TokenBucketLimiter {
    async fn acquire(&self, key: &str, quota: Quota) -> Result<(), Error> {
        if quota.limit_per_second == 0 {
            return Err(config_error("Rate limit must allow at least one request per second"));
        }

        let bucket = self.bucket(key, quota);
        let started = Instant::now();

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                match bucket.try_take(quota, Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() + wait > max_wait {
                    warn!("Rate limit exceeded for key {key}, giving up after {max_wait:?}");
                    return Err(external_error(
                        ExternalErrorKind::RateLimited,
                        &format!("No rate limit token available within {max_wait:?}"),
                    ));
                }
            }

            trace!("Rate limit reached for key {key}, waiting {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }
}
