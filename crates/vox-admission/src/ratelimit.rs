use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{AdmissionError, Result};

/// One bucket per (key-id, window). Refilled lazily on each consume attempt
/// by computing elapsed time since the last refill — no background task.
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self { tokens: capacity, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }

    /// Returns `Ok(())` if a token was consumed, else the wait time in
    /// seconds until the next token is available.
    fn try_consume(&mut self) -> std::result::Result<(), u64> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_s = (deficit / self.refill_per_sec).ceil() as u64;
            Err(wait_s.max(1))
        }
    }
}

/// Per-key-id token buckets enforcing both a per-minute and a per-day limit.
/// Mirrors the concurrent-map-of-small-per-key-state idiom used for provider
/// health tracking rather than reaching for a dedicated rate-limiting crate.
pub struct RateLimiter {
    minute_buckets: DashMap<String, Bucket>,
    day_buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { minute_buckets: DashMap::new(), day_buckets: DashMap::new() }
    }

    pub fn check(&self, key_id: &str, per_minute: u32, per_day: u32) -> Result<()> {
        let mut minute = self
            .minute_buckets
            .entry(key_id.to_string())
            .or_insert_with(|| Bucket::new(per_minute as f64, per_minute as f64 / 60.0));
        let mut day = self
            .day_buckets
            .entry(key_id.to_string())
            .or_insert_with(|| Bucket::new(per_day as f64, per_day as f64 / 86400.0));

        match minute.try_consume() {
            Ok(()) => {}
            Err(retry_after_s) => return Err(AdmissionError::RateLimited { retry_after_s }),
        }

        match day.try_consume() {
            Ok(()) => Ok(()),
            Err(retry_after_s) => {
                // Refund the minute token we just spent — the day limit is
                // the binding constraint for this request.
                minute.tokens = (minute.tokens + 1.0).min(minute.capacity);
                Err(AdmissionError::RateLimited { retry_after_s })
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_capacity() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("key-a", 5, 1000).is_ok());
        }
    }

    #[test]
    fn denies_once_capacity_is_exhausted() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            limiter.check("key-b", 3, 1000).unwrap();
        }
        let result = limiter.check("key-b", 3, 1000);
        assert!(matches!(result, Err(AdmissionError::RateLimited { .. })));
    }

    #[test]
    fn day_limit_binds_even_under_minute_capacity() {
        let limiter = RateLimiter::new();
        limiter.check("key-c", 100, 1).unwrap();
        let result = limiter.check("key-c", 100, 1);
        assert!(result.is_err());
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new();
        limiter.check("key-d", 1, 1000).unwrap();
        assert!(limiter.check("key-e", 1, 1000).is_ok());
    }

    #[test]
    fn refill_eventually_allows_another_request() {
        let mut bucket = Bucket::new(1.0, 1000.0);
        bucket.try_consume().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.try_consume().is_ok());
    }
}
