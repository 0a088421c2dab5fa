//! Per-client rate limiting built on lazily refilled token buckets.
//!
//! The limiter keeps one [`TokenBucket`] per client identity inside a single
//! coarse [`Mutex`]-guarded map. Admission is a synchronous check-and-spend
//! under that lock, with the clock read while the lock is held, so a burst
//! of concurrent requests for the same identity can never double-spend the
//! last token or feed an out-of-order timestamp into refill. The guard is
//! never held across an `.await` point.
//!
//! Bucket state for a client that stops sending requests is reclaimed by a
//! background eviction task, started when the limiter is built and stopped
//! explicitly through [`RateLimiter::stop`] during shutdown.
//!
//! # Contention
//!
//! One lock over the whole map is deliberate: the critical section is a hash
//! lookup plus a handful of float operations, which is dwarfed by per-request
//! I/O at the traffic levels this service targets. Shard the map before
//! reaching for anything fancier if profiles ever say otherwise.

mod bucket;

pub use bucket::{DEFAULT_BURST, DEFAULT_WINDOW, RateLimitPolicy};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use bucket::TokenBucket;

/// Tracks one token bucket per client identity and answers admission checks.
///
/// Construction spawns the eviction task, so a limiter must be built inside
/// a Tokio runtime and [`stop`](Self::stop) should be awaited on shutdown.
/// The limiter stays usable after `stop`; only the background sweep ends.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    sweeper: TaskTracker,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Builds a limiter and starts its eviction task, which wakes every
    /// `eviction_interval` and drops buckets idle for longer than `max_idle`.
    pub fn new(
        policy: RateLimitPolicy,
        eviction_interval: Duration,
        max_idle: Duration,
    ) -> Arc<Self> {
        let limiter = Arc::new(Self {
            policy,
            buckets: Mutex::new(HashMap::new()),
            sweeper: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        });
        limiter.spawn_eviction_task(eviction_interval, max_idle);
        limiter
    }

    /// Admission check for `identity` at the current time.
    ///
    /// Returns `true` and spends one token when a whole token is available,
    /// `false` otherwise. An identity seen for the first time gets a full
    /// bucket, so its initial burst is admitted.
    pub fn allow(&self, identity: &str) -> bool {
        let mut buckets = self.lock_buckets();
        // Read the clock under the lock: a caller that queued on the guard
        // must not apply a reading older than one a later caller already
        // fed into the bucket's refill arithmetic.
        let now = Instant::now();
        Self::admit(&mut buckets, &self.policy, identity, now)
    }

    /// Admission check against an explicit clock reading. Tests use this to
    /// steer time instead of sleeping.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut buckets = self.lock_buckets();
        Self::admit(&mut buckets, &self.policy, identity, now)
    }

    fn admit(
        buckets: &mut HashMap<String, TokenBucket>,
        policy: &RateLimitPolicy,
        identity: &str,
        now: Instant,
    ) -> bool {
        let bucket = buckets
            .entry(identity.to_owned())
            .or_insert_with(|| TokenBucket::full(policy, now));
        bucket.try_consume(policy, now)
    }

    /// Drops every bucket idle for longer than `max_idle` and returns how
    /// many were removed. A bucket exactly at `max_idle` survives.
    pub fn evict_stale(&self, max_idle: Duration) -> usize {
        self.evict_stale_at(max_idle, Instant::now())
    }

    /// Eviction against an explicit clock reading, for tests.
    pub fn evict_stale_at(&self, max_idle: Duration, now: Instant) -> usize {
        let mut buckets = self.lock_buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for(now) <= max_idle);
        let evicted = before - buckets.len();
        drop(buckets);

        if evicted > 0 {
            crate::metrics::record_buckets_evicted(evicted);
        }
        evicted
    }

    /// Number of client identities currently holding bucket state.
    pub fn tracked_clients(&self) -> usize {
        self.lock_buckets().len()
    }

    /// Refill policy shared by every bucket.
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Cancels the eviction task and waits for it to finish. Safe to call
    /// more than once.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.sweeper.close();
        self.sweeper.wait().await;
    }

    fn spawn_eviction_task(self: &Arc<Self>, eviction_interval: Duration, max_idle: Duration) {
        let limiter = Arc::clone(self);
        let token = self.shutdown.clone();

        self.sweeper.spawn(async move {
            let mut ticker = tokio::time::interval(eviction_interval);
            ticker.tick().await; // Skip the first immediate tick

            debug!(
                interval_secs = eviction_interval.as_secs(),
                max_idle_secs = max_idle.as_secs(),
                "Bucket eviction task started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!("Bucket eviction task stopping");
                        break;
                    }

                    _ = ticker.tick() => {
                        let evicted = limiter.evict_stale(max_idle);
                        if evicted > 0 {
                            debug!(evicted, "Evicted stale rate limit buckets");
                        }
                        crate::metrics::set_tracked_clients(limiter.tracked_clients());
                    }
                }
            }
        });
    }

    /// A poisoned mutex here only means another thread panicked mid-update;
    /// the bucket map is still structurally sound, so recover it rather than
    /// taking the whole service down.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter bucket map mutex poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Long enough that the background sweeper never fires mid-test.
    const QUIET: Duration = Duration::from_secs(3600);

    fn limiter() -> Arc<RateLimiter> {
        RateLimiter::new(RateLimitPolicy::default(), QUIET, QUIET)
    }

    #[tokio::test]
    async fn test_first_burst_admitted_then_rejected() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", now));
        }
        assert!(!limiter.allow_at("203.0.113.5", now));
    }

    #[tokio::test]
    async fn test_one_token_returns_after_sustained_interval() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", start));
        }
        assert!(!limiter.allow_at("203.0.113.5", start));

        // Exactly the sustained interval: 12.0 * (5.0/60.0) rounds to
        // precisely 1.0 in f64, so the boundary itself admits.
        let later = start + Duration::from_secs(12);
        assert!(limiter.allow_at("203.0.113.5", later));
        assert!(!limiter.allow_at("203.0.113.5", later));
    }

    #[tokio::test]
    async fn test_drained_client_regains_full_burst_after_one_window() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", start));
        }
        assert!(!limiter.allow_at("203.0.113.5", start));

        // Exactly one window: 60.0 * (5.0/60.0) rounds to precisely 5.0
        // in f64, restoring the full burst at the boundary.
        let later = start + Duration::from_secs(60);
        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", later));
        }
        assert!(!limiter.allow_at("203.0.113.5", later));
    }

    #[tokio::test]
    async fn test_long_idle_grants_exactly_one_burst() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", start));
        }

        let later = start + Duration::from_secs(86_400);
        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", later));
        }
        assert!(!limiter.allow_at("203.0.113.5", later));
    }

    #[tokio::test]
    async fn test_distinct_identities_keep_separate_buckets() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", now));
        }
        assert!(!limiter.allow_at("203.0.113.5", now));
        assert!(limiter.allow_at("198.51.100.7", now));
    }

    #[tokio::test]
    async fn test_stale_clock_reading_does_not_double_credit() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", start));
        }

        let later = start + Duration::from_secs(12);
        assert!(limiter.allow_at("203.0.113.5", later));

        // A reading from before the last refill spends nothing and, more
        // importantly, must not rewind the bucket so the next call at
        // `later` re-earns the token it already spent.
        assert!(!limiter.allow_at("203.0.113.5", start));
        assert!(!limiter.allow_at("203.0.113.5", later));
    }

    #[tokio::test]
    async fn test_concurrent_requests_cannot_double_spend_last_token() {
        let limiter = RateLimiter::new(
            RateLimitPolicy::per_window(1, Duration::from_secs(60)),
            QUIET,
            QUIET,
        );
        let now = Instant::now();
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if limiter.allow_at("203.0.113.5", now) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_drops_only_stale_buckets() {
        let limiter = limiter();
        let start = Instant::now();

        assert!(limiter.allow_at("stale", start));
        assert!(limiter.allow_at("boundary", start + Duration::from_secs(1)));
        assert!(limiter.allow_at("active", start + Duration::from_secs(500)));
        assert_eq!(limiter.tracked_clients(), 3);

        let max_idle = Duration::from_secs(600);
        let evicted = limiter.evict_stale_at(max_idle, start + Duration::from_secs(601));

        // "stale" is 601s idle; "boundary" sits exactly at the threshold.
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test]
    async fn test_evicted_identity_starts_over_with_a_full_bucket() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", start));
        }
        assert!(!limiter.allow_at("203.0.113.5", start));

        let later = start + Duration::from_secs(601);
        assert_eq!(limiter.evict_stale_at(Duration::from_secs(600), later), 1);
        assert_eq!(limiter.tracked_clients(), 0);

        for _ in 0..5 {
            assert!(limiter.allow_at("203.0.113.5", later));
        }
        assert!(!limiter.allow_at("203.0.113.5", later));
    }

    #[tokio::test]
    async fn test_stop_ends_the_sweeper_but_not_admission() {
        let limiter = limiter();
        limiter.stop().await;
        limiter.stop().await;
        assert!(limiter.allow("203.0.113.5"));
    }
}
