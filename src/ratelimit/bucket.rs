//! Token bucket admission state.

use std::time::{Duration, Instant};

/// Refill rate and capacity shared by every client bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    /// Tokens added per second
    pub refill_per_second: f64,
    /// Maximum tokens held, i.e. the largest burst
    pub burst: u32,
}

impl BucketPolicy {
    pub fn new(refill_per_second: f64, burst: u32) -> Self {
        Self {
            refill_per_second,
            burst,
        }
    }
}

impl Default for BucketPolicy {
    fn default() -> Self {
        Self::new(2.0, 10)
    }
}

/// A token bucket that starts full and refills continuously.
///
/// Not synchronized on its own; the limiter serializes access.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Tokens currently available
    tokens: f64,
    /// When `tokens` was last brought up to date
    last_refill: Instant,
    policy: BucketPolicy,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(policy: BucketPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.burst as f64,
            last_refill: now,
            policy,
        }
    }

    /// Take one token if available.
    ///
    /// Returns `true` if the request is admitted, `false` if the bucket is empty.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Duration until the next token is available.
    pub fn retry_after(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64((1.0 - self.tokens) / self.policy.refill_per_second)
                .unwrap_or(Duration::MAX)
        }
    }

    fn refill(&mut self, now: Instant) {
        // Clock readings from concurrent callers may arrive slightly out of order.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let capacity = self.policy.burst as f64;
            self.tokens = (self.tokens + elapsed * self.policy.refill_per_second).min(capacity);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_starts_full() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(BucketPolicy::new(1.0, 5), now);
        for _ in 0..5 {
            assert!(bucket.try_acquire(now));
        }
        assert!(!bucket.try_acquire(now));
    }

    #[test]
    fn test_bucket_empties_then_denies() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(BucketPolicy::new(1.0, 3), now);

        for _ in 0..3 {
            assert!(bucket.try_acquire(now));
        }

        // The 4th request in the same instant should be rejected
        assert!(!bucket.try_acquire(now));
        assert_eq!(bucket.retry_after(), Duration::from_secs(1));
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(BucketPolicy::new(10.0, 4), start);
        assert!(bucket.try_acquire(start));

        let later = start + Duration::from_secs(60);
        for _ in 0..4 {
            assert!(bucket.try_acquire(later));
        }
        assert!(!bucket.try_acquire(later));
        assert_eq!(bucket.retry_after(), Duration::from_millis(100));
    }

    #[test]
    fn test_out_of_order_clock_does_not_refill() {
        let start = Instant::now() + Duration::from_secs(1);
        let mut bucket = TokenBucket::new(BucketPolicy::new(1.0, 1), start);
        assert!(bucket.try_acquire(start));

        let earlier = start - Duration::from_millis(500);
        assert!(!bucket.try_acquire(earlier));
    }
}
