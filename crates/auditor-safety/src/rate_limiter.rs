//! Single process-wide token bucket guarding executor dispatch (spec.md
//! §4.5 "Rate limiter"). Unlike a per-tenant limiter this bucket is shared
//! across every integration in a session — within one integration actions
//! are already sequential, so the bucket only needs to arbitrate between
//! concurrently running integrations.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Configuration for the token bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Steady-state refill rate.
    pub requests_per_second: f64,
    /// Maximum burst capacity (bucket size).
    pub burst_limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_limit: 20,
        }
    }
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            capacity: config.burst_limit as f64,
            tokens: config.burst_limit as f64,
            refill_rate: config.requests_per_second.max(0.0),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_token(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - self.tokens;
        Duration::from_secs_f64(deficit / self.refill_rate)
    }
}

/// A process-wide rate limiter. Acquiring a token may require waiting;
/// callers that need to honor a session-wide cancellation signal should
/// race `wait_for_token` against their own cancellation future.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Construct a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket::new(config)),
        }
    }

    /// Non-blocking attempt to acquire a single token.
    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().try_consume()
    }

    /// Block (async-sleep) until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.try_consume() {
                    return;
                }
                bucket.time_until_token()
            };
            if wait > Duration::ZERO {
                tokio::time::sleep(wait).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }
}
