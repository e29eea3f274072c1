//! Fixed-window rate limiter keyed by client identity.
//!
//! # Algorithm
//!
//! Each identity owns a window `{start, count}`. On every request:
//!
//! 1. If `now - start >= window`, the window restarts at `now` with count 0
//! 2. The count is incremented
//! 3. The request is admitted iff the new count is `<= max`
//!
//! Denied requests still count. A client may send `max` requests at the end of
//! one window and `max` more at the start of the next; fixed windows accept
//! that boundary burst.
//!
//! # Memory
//!
//! Windows are created lazily. `evict_expired` drops windows that have
//! already ended; a dropped window and a reset window behave identically, so
//! the sweep only bounds memory.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Per-identity request counter.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Thread-safe fixed-window limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `max_requests` per identity per `window`.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Count one request for `identity` and report whether it is admitted.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Drop every window that has already ended, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    /// Number of identities with a stored window.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Configured maximum requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub(crate) fn allow_at(&self, identity: &str, now: Instant) -> bool {
        // The entry guard holds the shard lock, so reset + increment is atomic
        let count = match self.windows.entry(identity.to_string()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if now.saturating_duration_since(state.start) >= self.window {
                    state.start = now;
                    state.count = 0;
                }
                state.count = state.count.saturating_add(1);
                state.count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Window {
                    start: now,
                    count: 1,
                });
                1
            }
        };

        count <= self.max_requests
    }

    pub(crate) fn evict_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.saturating_duration_since(state.start) < self.window);
        before.saturating_sub(self.windows.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_admits_up_to_max_then_denies() {
        let limiter = FixedWindowLimiter::new(WINDOW, 5);
        let now = Instant::now();

        for i in 1..=5 {
            assert!(limiter.allow_at("1.2.3.4", now), "request {i} should pass");
        }
        assert!(!limiter.allow_at("1.2.3.4", now));
        assert!(!limiter.allow_at("1.2.3.4", now));
    }

    #[test]
    fn test_next_window_is_admitted() {
        let limiter = FixedWindowLimiter::new(WINDOW, 5);
        let start = Instant::now();

        for _ in 0..6 {
            limiter.allow_at("client", start);
        }
        assert!(!limiter.allow_at("client", start + WINDOW - Duration::from_millis(1)));

        // Exactly one window later the counter resets
        assert!(limiter.allow_at("client", start + WINDOW));
    }

    #[test]
    fn test_boundary_burst_is_permitted() {
        let limiter = FixedWindowLimiter::new(WINDOW, 3);
        let start = Instant::now();
        let end_of_window = start + WINDOW - Duration::from_millis(1);

        // Open the window, then burst at its very end
        assert!(limiter.allow_at("c", start));
        assert!(limiter.allow_at("c", end_of_window));
        assert!(limiter.allow_at("c", end_of_window));

        // Full quota again right after the boundary
        let next = start + WINDOW;
        for _ in 0..3 {
            assert!(limiter.allow_at("c", next));
        }
        assert!(!limiter.allow_at("c", next));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = FixedWindowLimiter::new(WINDOW, 1);
        let now = Instant::now();

        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now));
        assert!(limiter.allow_at("b", now));
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn test_evict_expired_drops_only_ended_windows() {
        let limiter = FixedWindowLimiter::new(WINDOW, 5);
        let start = Instant::now();

        limiter.allow_at("stale", start);
        limiter.allow_at("active", start + Duration::from_secs(30));

        let evicted = limiter.evict_expired_at(start + WINDOW);

        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_eviction_does_not_change_admission() {
        let limiter = FixedWindowLimiter::new(WINDOW, 1);
        let start = Instant::now();

        assert!(limiter.allow_at("c", start));
        assert!(!limiter.allow_at("c", start));

        limiter.evict_expired_at(start + WINDOW);
        assert!(limiter.allow_at("c", start + WINDOW));
    }

    #[test]
    fn test_accessors() {
        let limiter = FixedWindowLimiter::new(WINDOW, 5);
        assert_eq!(limiter.window(), WINDOW);
        assert_eq!(limiter.max_requests(), 5);
    }

    #[test]
    fn test_concurrent_allow_admits_exactly_max() {
        use std::sync::Barrier;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let limiter = FixedWindowLimiter::new(WINDOW, 5);
        let admitted = AtomicUsize::new(0);
        let barrier = Barrier::new(64);

        std::thread::scope(|scope| {
            for _ in 0..64 {
                scope.spawn(|| {
                    barrier.wait();
                    if limiter.allow("c") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 5);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_concurrent_identities_are_independent() {
        let limiter = FixedWindowLimiter::new(WINDOW, 3);

        std::thread::scope(|scope| {
            for i in 0..16 {
                let limiter = &limiter;
                scope.spawn(move || {
                    let identity = format!("client-{i}");
                    for _ in 0..3 {
                        assert!(limiter.allow(&identity));
                    }
                    assert!(!limiter.allow(&identity));
                });
            }
        });

        assert_eq!(limiter.tracked_identities(), 16);
    }
}
