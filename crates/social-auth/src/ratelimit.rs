//! Fixed-window rate limiting keyed by client address.
//!
//! Each key owns a [`RateWindow`] counting admissions since the window
//! started. Window starts are aligned to a grid anchored at the limiter's
//! epoch, so every key rolls over at the same instants. A client can burst up
//! to twice the limit across a window boundary; that is accepted.
//!
//! Windows are created lazily and only removed by [`RateLimiter::sweep_at`],
//! which a background task calls periodically (see
//! [`RateLimiter::spawn_sweeper`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::RateLimiterConfig;

/// Counter for one key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Admissions in this window.
    pub count: u32,
    /// When the window opened.
    pub window_start: Instant,
}

/// Outcome of [`RateLimiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Time until the window closes. Zero when admitted.
    pub retry_after: Duration,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    fn denied(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// Snapshot of rate limiter metrics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    /// Total requests that were admitted.
    pub allowed: u64,
    /// Total requests that were rejected.
    pub rejected: u64,
    /// Windows currently held in memory.
    pub tracked_windows: usize,
}

/// A fixed-window rate limiter.
///
/// Thread-safe; each key's read-modify-write happens under its `DashMap`
/// shard lock.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    limit: u32,
    window: Duration,
    eviction_age: Duration,
    epoch: Instant,
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("tracked_windows", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter whose window grid starts now.
    #[must_use]
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self::with_epoch(config, Instant::now())
    }

    /// Creates a limiter whose window grid starts at `epoch`.
    #[must_use]
    pub fn with_epoch(config: &RateLimiterConfig, epoch: Instant) -> Self {
        Self {
            windows: DashMap::new(),
            limit: config.requests_per_window,
            window: config.window_size,
            eviction_age: config.eviction_age(),
            epoch,
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Requests admitted per window.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of a window.
    #[must_use]
    pub fn window_size(&self) -> Duration {
        self.window
    }

    /// Admits or denies a request from `key` at the current time.
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admits or denies a request from `key` at `now`.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let admission = match self.windows.get_mut(key) {
            Some(mut window) => self.apply(&mut window, now),
            None => {
                let start = self.aligned_start(now);
                let mut window = self
                    .windows
                    .entry(key.to_owned())
                    .or_insert_with(|| RateWindow {
                        count: 0,
                        window_start: start,
                    });
                self.apply(&mut window, now)
            }
        };

        if admission.allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                client = %key,
                retry_after_ms = admission.retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
        }

        admission
    }

    fn apply(&self, window: &mut RateWindow, now: Instant) -> Admission {
        if now.saturating_duration_since(window.window_start) >= self.window {
            window.window_start = self.aligned_start(now);
            window.count = 0;
        }

        if window.count >= self.limit {
            let closes = window.window_start + self.window;
            return Admission::denied(closes.saturating_duration_since(now));
        }

        window.count += 1;
        Admission::allowed()
    }

    /// Start of the grid window containing `now`.
    fn aligned_start(&self, now: Instant) -> Instant {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        let offset = elapsed - elapsed % self.window.as_nanos().max(1);
        self.epoch + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
    }

    /// Returns the window tracked for `key`, if any.
    #[must_use]
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).map(|w| *w)
    }

    /// Number of windows held in memory.
    #[must_use]
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// Removes windows that opened at least the eviction age before `now`.
    ///
    /// Returns the number of evicted windows.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) < self.eviction_age);
        before.saturating_sub(self.windows.len())
    }

    /// Returns a snapshot of the limiter metrics.
    #[must_use]
    pub fn metrics(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            tracked_windows: self.windows.len(),
        }
    }

    /// Spawns a task sweeping idle windows every `interval`.
    ///
    /// The task holds a weak reference and exits once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep_at(Instant::now());
                if evicted > 0 {
                    tracing::debug!(
                        evicted,
                        remaining = limiter.tracked_windows(),
                        "Swept idle rate windows"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, window: Duration) -> RateLimiterConfig {
        RateLimiterConfig {
            enabled: true,
            requests_per_window: limit,
            window_size: window,
            sweep_interval: Duration::from_secs(60),
            eviction_windows: 3,
        }
    }

    #[test]
    fn test_admits_up_to_limit() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(3, Duration::from_secs(1)), t0);

        for _ in 0..3 {
            assert!(limiter.admit_at("10.0.0.1", t0).allowed);
        }
        let denied = limiter.admit_at("10.0.0.1", t0 + Duration::from_millis(400));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_millis(600));
    }

    #[test]
    fn test_keys_are_independent() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(1, Duration::from_secs(1)), t0);

        assert!(limiter.admit_at("a", t0).allowed);
        assert!(!limiter.admit_at("a", t0).allowed);
        assert!(limiter.admit_at("b", t0).allowed);
    }

    #[test]
    fn test_boundary_burst_admitted() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(5, Duration::from_secs(1)), t0);

        for _ in 0..5 {
            assert!(limiter.admit_at("c", t0 + Duration::from_millis(990)).allowed);
        }
        for _ in 0..5 {
            assert!(limiter.admit_at("c", t0 + Duration::from_millis(1010)).allowed);
        }
        assert!(!limiter.admit_at("c", t0 + Duration::from_millis(1020)).allowed);
    }

    #[test]
    fn test_never_exceeds_limit_within_window() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(4, Duration::from_secs(2)), t0);

        let admitted = (0..100)
            .filter(|i| {
                limiter
                    .admit_at("d", t0 + Duration::from_millis(i * 19))
                    .allowed
            })
            .count();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn test_window_resets() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(1, Duration::from_secs(1)), t0);

        assert!(limiter.admit_at("e", t0).allowed);
        assert!(!limiter.admit_at("e", t0 + Duration::from_millis(999)).allowed);
        assert!(limiter.admit_at("e", t0 + Duration::from_secs(1)).allowed);

        let window = limiter.window("e").unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.window_start, t0 + Duration::from_secs(1));
    }

    #[test]
    fn test_window_start_is_aligned() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(10, Duration::from_secs(5)), t0);

        limiter.admit_at("f", t0 + Duration::from_millis(12_300));
        assert_eq!(
            limiter.window("f").unwrap().window_start,
            t0 + Duration::from_secs(10)
        );
    }

    #[test]
    fn test_sweep_evicts_idle_windows() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(10, Duration::from_secs(1)), t0);

        limiter.admit_at("old", t0);
        limiter.admit_at("new", t0 + Duration::from_secs(2));
        assert_eq!(limiter.tracked_windows(), 2);

        let evicted = limiter.sweep_at(t0 + Duration::from_secs(3));
        assert_eq!(evicted, 1);
        assert!(limiter.window("old").is_none());
        assert!(limiter.window("new").is_some());
    }

    #[test]
    fn test_metrics() {
        let t0 = Instant::now();
        let limiter = RateLimiter::with_epoch(&config(1, Duration::from_secs(1)), t0);

        limiter.admit_at("g", t0);
        limiter.admit_at("g", t0);
        let metrics = limiter.metrics();
        assert_eq!(metrics.allowed, 1);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.tracked_windows, 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_limiter_dropped() {
        let limiter = Arc::new(RateLimiter::new(&config(1, Duration::from_millis(1))));
        let handle = limiter.spawn_sweeper(Duration::from_millis(5));
        drop(limiter);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit")
            .unwrap();
    }
}
