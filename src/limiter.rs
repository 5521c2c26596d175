//! Per-client sliding-window rate limiting.
//!
//! Keeps one time-ordered queue of admitted event timestamps per client
//! address and admits a new event only while the count of events in the
//! trailing window stays below the limit. Unlike a token bucket, this
//! gives exact "at most N events per trailing W seconds" semantics.
//!
//! Buckets live in a single `Mutex<HashMap>` so that eviction, the count
//! check, and the append are atomic with respect to each other; two
//! concurrent admits for the same address can never both observe a free
//! slot and overshoot the limit. Stale buckets are pruned via
//! [`SlidingWindowLimiter::prune`], which should be called from a
//! background task to keep memory bounded under high address cardinality.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A sliding-window rate limiter keyed by client address.
///
/// Constructed once at startup and shared across request handlers via
/// `Arc`. State is process-local; multi-instance deployments need an
/// externally shared store behind the same interface.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter admitting at most `limit` events per client
    /// within the trailing `window`.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether an event for `addr` occurring at `now` is within
    /// the allowed rate, recording it if so.
    ///
    /// Entries strictly older than `now - window` are evicted from the
    /// head of the bucket first; an entry aged exactly `window` still
    /// counts against the limit. Returns `false` without recording the
    /// event when the bucket is full.
    pub fn admit(&self, addr: &str, now: Instant) -> bool {
        let mut buckets = self.lock_buckets();
        let bucket = buckets.entry(addr.to_owned()).or_default();

        evict_expired(bucket, now, self.window);

        if bucket.len() >= self.limit {
            return false;
        }
        bucket.push_back(now);
        true
    }

    /// Drops buckets that hold no events within the window as of `now`.
    pub fn prune(&self, now: Instant) {
        let mut buckets = self.lock_buckets();
        buckets.retain(|_, bucket| {
            evict_expired(bucket, now, self.window);
            !bucket.is_empty()
        });
    }

    /// Returns the number of client addresses currently tracked.
    pub fn tracked_addr_count(&self) -> usize {
        self.lock_buckets().len()
    }

    /// Locks the bucket map, recovering from poisoning. The critical
    /// sections never leave a bucket half-updated, so a guard dropped
    /// during a panic is still consistent.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pops timestamps strictly older than `now - window` from the bucket
/// head. Buckets are append-only at the tail, so remaining entries stay
/// in non-decreasing time order.
fn evict_expired(bucket: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while bucket
        .front()
        .is_some_and(|ts| now.duration_since(*ts) > window)
    {
        bucket.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    /// Returns a base instant far enough in the past that offsets within
    /// the test scenarios never underflow.
    fn base() -> Instant {
        Instant::now()
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn admits_up_to_limit_within_window() {
        let limiter = SlidingWindowLimiter::new(5, WINDOW);
        let t0 = base();

        for _ in 0..5 {
            assert!(limiter.admit("10.0.0.1", t0));
        }
        assert!(!limiter.admit("10.0.0.1", at(t0, 10)));
    }

    #[test]
    fn window_slides_after_eviction() {
        let limiter = SlidingWindowLimiter::new(5, WINDOW);
        let t0 = base();

        for _ in 0..5 {
            assert!(limiter.admit("10.0.0.1", t0));
        }
        assert!(!limiter.admit("10.0.0.1", at(t0, 10)));
        // At t=61 the five t=0 entries are strictly older than the window.
        assert!(limiter.admit("10.0.0.1", at(t0, 61)));
    }

    #[test]
    fn entry_aged_exactly_window_still_counts() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);
        let t0 = base();

        assert!(limiter.admit("10.0.0.1", t0));
        assert!(!limiter.admit("10.0.0.1", at(t0, 60)));
        assert!(limiter.admit("10.0.0.1", at(t0, 61)));
    }

    #[test]
    fn denied_events_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);
        let t0 = base();

        assert!(limiter.admit("10.0.0.1", t0));
        // Denied attempts must not extend the client's busy period.
        assert!(!limiter.admit("10.0.0.1", at(t0, 30)));
        assert!(!limiter.admit("10.0.0.1", at(t0, 59)));
        assert!(limiter.admit("10.0.0.1", at(t0, 61)));
    }

    #[test]
    fn addresses_are_isolated() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);
        let t0 = base();

        assert!(limiter.admit("10.0.0.1", t0));
        assert!(!limiter.admit("10.0.0.1", t0));
        assert!(limiter.admit("10.0.0.2", t0));
    }

    #[test]
    fn bucket_never_exceeds_limit() {
        let limiter = SlidingWindowLimiter::new(3, WINDOW);
        let t0 = base();

        for i in 0..50 {
            limiter.admit("10.0.0.1", at(t0, i));
        }

        let buckets = limiter.buckets.lock().unwrap();
        assert!(buckets["10.0.0.1"].len() <= 3);
    }

    #[test]
    fn prune_drops_idle_addresses() {
        let limiter = SlidingWindowLimiter::new(5, WINDOW);
        let t0 = base();

        limiter.admit("10.0.0.1", t0);
        limiter.admit("10.0.0.2", at(t0, 100));
        assert_eq!(limiter.tracked_addr_count(), 2);

        limiter.prune(at(t0, 120));
        assert_eq!(limiter.tracked_addr_count(), 1);

        limiter.prune(at(t0, 200));
        assert_eq!(limiter.tracked_addr_count(), 0);
    }

    #[test]
    fn keeps_serving_after_a_poisoned_lock() {
        let limiter = std::sync::Arc::new(SlidingWindowLimiter::new(1, WINDOW));

        let poisoner = std::sync::Arc::clone(&limiter);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.buckets.lock().unwrap();
            panic!("poison the bucket lock");
        })
        .join();

        // Admission, pruning, and counting all recover.
        assert!(limiter.admit("10.0.0.1", Instant::now()));
        assert!(!limiter.admit("10.0.0.1", Instant::now()));
        assert_eq!(limiter.tracked_addr_count(), 1);
        limiter.prune(Instant::now() + Duration::from_secs(120));
        assert_eq!(limiter.tracked_addr_count(), 0);
    }

    #[test]
    fn admits_again_after_prune() {
        let limiter = SlidingWindowLimiter::new(1, WINDOW);
        let t0 = base();

        assert!(limiter.admit("10.0.0.1", t0));
        limiter.prune(at(t0, 120));
        assert!(limiter.admit("10.0.0.1", at(t0, 121)));
    }
}
