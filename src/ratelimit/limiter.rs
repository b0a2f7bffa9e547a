//! Per-client rate limiter with idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::bucket::{BucketPolicy, TokenBucket};
use super::key::ClientKey;
use crate::config::RateLimitingConfig;

/// Admission state tracked for one client.
#[derive(Debug)]
struct ClientVisitor {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Tracks one token bucket per client key.
///
/// The key→state map is private; every access goes through `admit` or the
/// sweep, both of which hold the lock only for the map operation itself.
pub struct ClientRateLimiter {
    visitors: Mutex<HashMap<ClientKey, ClientVisitor>>,
    policy: BucketPolicy,
    /// Visitors idle longer than this are removed by the sweep
    idle_timeout: Duration,
}

impl ClientRateLimiter {
    pub fn new(policy: BucketPolicy, idle_timeout: Duration) -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
            policy,
            idle_timeout,
        }
    }

    pub fn from_config(config: &RateLimitingConfig) -> Self {
        Self::new(
            BucketPolicy::new(config.refill_per_second, config.burst),
            config.idle_timeout(),
        )
    }

    /// Decide whether a request from `key` may proceed.
    pub fn admit(&self, key: &ClientKey) -> bool {
        self.check(key).is_ok()
    }

    /// `admit` against an explicit clock reading.
    pub fn admit_at(&self, key: &ClientKey, now: Instant) -> bool {
        self.check_at(key, now).is_ok()
    }

    /// Like `admit`, but a denial carries the wait until the next token.
    pub fn check(&self, key: &ClientKey) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    /// `check` against an explicit clock reading.
    pub fn check_at(&self, key: &ClientKey, now: Instant) -> Result<(), Duration> {
        let outcome = {
            let mut visitors = self.visitors.lock();
            let visitor = visitors.entry(key.clone()).or_insert_with(|| {
                debug!(client = %key, burst = self.policy.burst, "Tracking new client");
                ClientVisitor {
                    bucket: TokenBucket::new(self.policy, now),
                    last_seen: now,
                }
            });
            visitor.last_seen = now;
            if visitor.bucket.try_acquire(now) {
                Ok(())
            } else {
                Err(visitor.bucket.retry_after())
            }
        };

        match outcome {
            Ok(()) => trace!(client = %key, "Request admitted"),
            Err(wait) => debug!(client = %key, retry_after_ms = wait.as_millis() as u64, "Rate limit exceeded"),
        }
        outcome
    }

    /// Remove clients idle longer than the configured window.
    ///
    /// Returns the number of evicted clients.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// `sweep_idle` against an explicit clock reading.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.lock();
        let before = visitors.len();
        visitors.retain(|_, v| now.saturating_duration_since(v.last_seen) <= self.idle_timeout);
        before - visitors.len()
    }

    /// Number of clients currently tracked.
    pub fn visitor_count(&self) -> usize {
        self.visitors.lock().len()
    }

    pub fn policy(&self) -> BucketPolicy {
        self.policy
    }

    /// Run the idle sweep every `interval` until the returned task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.sweep_idle();
                if evicted > 0 {
                    info!(evicted, remaining = limiter.visitor_count(), "Evicted idle clients");
                }
            }
        })
    }
}

impl Default for ClientRateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(refill: f64, burst: u32) -> ClientRateLimiter {
        ClientRateLimiter::new(BucketPolicy::new(refill, burst), Duration::from_secs(180))
    }

    #[test]
    fn test_limiter_creation() {
        let limiter = ClientRateLimiter::default();
        assert_eq!(limiter.visitor_count(), 0);
        assert_eq!(limiter.policy().burst, 10);
    }

    #[test]
    fn test_first_request_creates_visitor() {
        let limiter = limiter(2.0, 10);
        assert!(limiter.admit(&ClientKey::new("10.0.0.1")));
        assert_eq!(limiter.visitor_count(), 1);
    }

    #[test]
    fn test_burst_then_deny_then_one_refill() {
        let limiter = limiter(2.0, 5);
        let key = ClientKey::new("10.0.0.1");
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit_at(&key, now));
        }
        assert!(!limiter.admit_at(&key, now));

        // One token every 500ms at 2/s
        let later = now + Duration::from_millis(500);
        assert!(limiter.admit_at(&key, later));
        assert!(!limiter.admit_at(&key, later));
    }

    #[test]
    fn test_clients_have_separate_buckets() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        let a = ClientKey::new("10.0.0.1");
        let b = ClientKey::new("10.0.0.2");

        assert!(limiter.admit_at(&a, now));
        assert!(!limiter.admit_at(&a, now));
        assert!(limiter.admit_at(&b, now));
        assert_eq!(limiter.visitor_count(), 2);
    }

    #[test]
    fn test_sweep_evicts_idle_and_resets_budget() {
        let limiter = limiter(0.001, 2);
        let key = ClientKey::new("10.0.0.1");
        let start = Instant::now();

        assert!(limiter.admit_at(&key, start));
        assert!(limiter.admit_at(&key, start));
        assert!(!limiter.admit_at(&key, start));

        let idle = start + Duration::from_secs(181);
        assert_eq!(limiter.sweep_at(idle), 1);
        assert_eq!(limiter.visitor_count(), 0);

        // Full burst again, as on first sight
        assert!(limiter.admit_at(&key, idle));
        assert!(limiter.admit_at(&key, idle));
        assert!(!limiter.admit_at(&key, idle));
    }

    #[test]
    fn test_denied_requests_refresh_last_seen() {
        let limiter = limiter(0.001, 1);
        let key = ClientKey::new("10.0.0.1");
        let start = Instant::now();

        assert!(limiter.admit_at(&key, start));
        let retry = start + Duration::from_secs(120);
        assert!(!limiter.admit_at(&key, retry));

        // Idle for 180s since the denied attempt, not since the first request
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(200)), 0);
        assert_eq!(limiter.sweep_at(retry + Duration::from_secs(181)), 1);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_burst() {
        let limiter = Arc::new(limiter(0.001, 50));
        let key = ClientKey::new("10.0.0.9");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let key = key.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.admit(&key)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(limiter.visitor_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_evicts() {
        let limiter = Arc::new(ClientRateLimiter::new(
            BucketPolicy::new(1.0, 1),
            Duration::from_millis(10),
        ));
        limiter.admit_at(&ClientKey::new("10.0.0.1"), Instant::now() - Duration::from_secs(5));
        assert_eq!(limiter.visitor_count(), 1);

        let handle = limiter.spawn_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(limiter.visitor_count(), 0);
        handle.abort();
    }

    #[test]
    fn test_denial_reports_wait_for_next_token() {
        let limiter = limiter(2.0, 1);
        let key = ClientKey::new("10.0.0.9");
        let start = Instant::now();

        assert_eq!(limiter.check_at(&key, start), Ok(()));
        assert_eq!(limiter.check_at(&key, start), Err(Duration::from_millis(500)));

        let halfway = start + Duration::from_millis(250);
        assert_eq!(limiter.check_at(&key, halfway), Err(Duration::from_millis(250)));
    }
}
