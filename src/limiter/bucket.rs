//! Token-bucket primitives for per-client admission control.
//!
//! A bucket holds a fractional token balance that refills continuously at a
//! fixed rate and is capped at a burst capacity. Refill is lazy: the balance
//! is brought up to date from the elapsed wall time on each access, so idle
//! buckets cost nothing between requests.

use std::time::{Duration, Instant};

/// Default burst size admitted from a full bucket.
pub const DEFAULT_BURST: u32 = 5;

/// Default window over which a fully drained bucket refills.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Refill policy shared by every bucket a limiter manages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Maximum token balance (burst size).
    pub capacity: f64,
    /// Tokens restored per second of elapsed time.
    pub refill_per_sec: f64,
}

impl RateLimitPolicy {
    /// Policy that admits `burst` requests instantly and restores the full
    /// burst over `window`.
    ///
    /// `burst` must be at least 1 and `window` non-zero; both are enforced
    /// by config validation before a limiter is built.
    pub fn per_window(burst: u32, window: Duration) -> Self {
        Self {
            capacity: f64::from(burst),
            refill_per_sec: f64::from(burst) / window.as_secs_f64(),
        }
    }

    /// Time for one whole token to come back under sustained load. Drives
    /// the `Retry-After` hint attached to rejections.
    pub fn sustained_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.refill_per_sec).unwrap_or(DEFAULT_WINDOW)
    }
}

impl Default for RateLimitPolicy {
    /// Five requests of burst, refilled over one minute (one token every
    /// twelve seconds of sustained traffic).
    fn default() -> Self {
        Self::per_window(DEFAULT_BURST, DEFAULT_WINDOW)
    }
}

/// Per-client token balance. Created full so a client's first burst is
/// admitted without warm-up.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    /// Current balance, always within `[0, policy.capacity]`.
    tokens: f64,
    /// Instant of the last refill calculation; doubles as the last-touch
    /// timestamp for staleness eviction.
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn full(policy: &RateLimitPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.capacity,
            last_refill: now,
        }
    }

    /// Brings the balance up to date for `now`, then spends one token if a
    /// whole one is available. Partial balances are never spent.
    pub(crate) fn try_consume(&mut self, policy: &RateLimitPolicy, now: Instant) -> bool {
        self.refill(policy, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long this bucket has gone untouched as of `now`.
    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_refill)
    }

    fn refill(&mut self, policy: &RateLimitPolicy, now: Instant) {
        // A reading older than `last_refill` covers time that has already
        // been credited; rewinding the timestamp would credit it twice.
        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        self.tokens = policy
            .capacity
            .min(self.tokens + elapsed.as_secs_f64() * policy.refill_per_sec);
        self.last_refill = now;
    }
}
