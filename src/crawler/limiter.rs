//! Per-domain politeness limiter
//!
//! One token bucket per domain, local to the process. Crawler slots wait
//! for a token before fetching, so a domain that was just fetched is
//! delayed rather than hit again immediately. Other processes keep their
//! own buckets; politeness across processes is best effort.
//!
//! The bucket map is an LRU bounded to [`MAX_TRACKED_DOMAINS`]; an evicted
//! domain starts over with a full bucket.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Domains with a live bucket per process
pub const MAX_TRACKED_DOMAINS: usize = 1000;

/// Longest single wait handed out; waiters re-check after it
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Decision for one token request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// A token was taken; fetch now
    Allow,
    /// No token yet; try again after the given wait
    Deny { retry_after: Duration },
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    /// Tokens per second
    rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: f64, capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            rate,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> RateLimitDecision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return RateLimitDecision::Allow;
        }
        let missing = 1.0 - self.tokens;
        let retry_after = Duration::try_from_secs_f64(missing / self.rate)
            .map_or(MAX_RETRY_AFTER, |wait| wait.min(MAX_RETRY_AFTER));
        RateLimitDecision::Deny { retry_after }
    }
}

/// Token buckets keyed by domain
pub struct DomainRateLimiter {
    rate: f64,
    burst: f64,
    buckets: Mutex<LruCache<String, Bucket>>,
}

impl DomainRateLimiter {
    /// Creates a limiter refilling `requests_per_second` tokens per domain,
    /// holding at most `burst` tokens
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self::with_max_domains(requests_per_second, burst, MAX_TRACKED_DOMAINS)
    }

    /// Like [`DomainRateLimiter::new`], keeping at most `max_domains` buckets
    pub fn with_max_domains(requests_per_second: f64, burst: u32, max_domains: usize) -> Self {
        let capacity = NonZeroUsize::new(max_domains).unwrap_or(NonZeroUsize::MIN);
        Self {
            rate: requests_per_second.max(f64::MIN_POSITIVE),
            burst: f64::from(burst.max(1)),
            buckets: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Bucket>> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes a token for `domain` if one is available
    pub fn try_acquire(&self, domain: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut buckets = self.lock();
        buckets
            .get_or_insert_mut(domain.to_string(), || Bucket::new(self.rate, self.burst, now))
            .try_take(now)
    }

    /// Waits until a token for `domain` is available and takes it
    pub async fn acquire(&self, domain: &str) {
        loop {
            match self.try_acquire(domain) {
                RateLimitDecision::Allow => return,
                RateLimitDecision::Deny { retry_after } => {
                    tracing::trace!("Rate limited on {}, waiting {:?}", domain, retry_after);
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// Slows `domain` down to one request per `delay_secs`
    ///
    /// Applied from a robots.txt `Crawl-delay`; never speeds a domain up.
    pub fn apply_crawl_delay(&self, domain: &str, delay_secs: f64) {
        if delay_secs <= 0.0 || !delay_secs.is_finite() {
            return;
        }

        let delayed_rate = 1.0 / delay_secs;
        if delayed_rate >= self.rate {
            return;
        }

        let now = Instant::now();
        let mut buckets = self.lock();
        let bucket =
            buckets.get_or_insert_mut(domain.to_string(), || Bucket::new(self.rate, self.burst, now));

        if bucket.rate > delayed_rate {
            bucket.refill(now);
            bucket.rate = delayed_rate;
            bucket.capacity = 1.0;
            bucket.tokens = bucket.tokens.min(1.0);
        }
    }

    /// Current refill rate of `domain`, if it has a bucket
    pub fn rate_for(&self, domain: &str) -> Option<f64> {
        self.lock().peek(domain).map(|b| b.rate)
    }

    /// Number of domains with a bucket
    pub fn tracked_domains(&self) -> usize {
        self.lock().len()
    }
}
