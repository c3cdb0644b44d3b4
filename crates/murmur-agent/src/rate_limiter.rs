//! Per-identity sliding-window rate limiting for inbound commands and guidance.
//!
//! Each identity keeps the timestamps of its admitted requests. Entries that
//! have aged out of the window are pruned before every admission decision.
//!
//! # Memory Management
//!
//! Pruning only touches the identity being checked, so identities that stop
//! sending would otherwise keep an empty entry forever. Every
//! `cleanup_interval` checks, [`RateLimiter::sweep_idle`] drops identities with
//! no in-window requests, which bounds the map to identities active within one
//! window.

use murmur_core::short_id;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for a rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per identity within the window
    pub max_requests: usize,
    /// Size of the sliding window
    pub window: Duration,
    /// Sweep idle identities every N admission checks
    pub cleanup_interval: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cleanup_interval: 100,
        }
    }

    pub fn with_cleanup_interval(mut self, every: u64) -> Self {
        self.cleanup_interval = every.max(1);
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // 10 commands per hour
        Self::new(10, Duration::from_secs(60 * 60))
    }
}

/// Sliding-window rate limiter keyed by sender identity
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            "Rate limiter initialized: {} requests per {} minutes",
            config.max_requests,
            config.window.as_secs() / 60
        );
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether `identity` may make another request, recording it if so
    pub fn allow(&self, identity: &str) -> bool {
        let count = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.config.cleanup_interval.max(1) == 0 {
            let removed = self.sweep_idle();
            debug!(removed, "Periodic rate limiter sweep");
        }

        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(identity.to_string()).or_default();
        prune(window, now, self.config.window);

        if window.len() >= self.config.max_requests {
            warn!(
                identity = %short_id(identity),
                "Rate limit exceeded ({}/{})",
                window.len(),
                self.config.max_requests
            );
            return false;
        }

        window.push_back(now);
        true
    }

    /// Clear the window of one identity
    pub fn reset(&self, identity: &str) {
        self.lock().remove(identity);
        info!(identity = %short_id(identity), "Rate limit reset");
    }

    /// Clear every identity
    pub fn reset_all(&self) {
        self.lock().clear();
        info!("Rate limit reset for all identities");
    }

    /// Drop identities with no requests left inside the window.
    ///
    /// Returns how many identities were removed.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, window| {
            prune(window, now, self.config.window);
            !window.is_empty()
        });
        before - windows.len()
    }

    /// Number of identities currently holding a window
    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Remove timestamps that are `window` or more in the past
fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_rejects_request_over_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, HOUR));

        assert!(limiter.allow("npub1alice"));
        assert!(limiter.allow("npub1alice"));
        assert!(limiter.allow("npub1alice"));
        assert!(!limiter.allow("npub1alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, HOUR));

        assert!(limiter.allow("npub1alice"));
        assert!(!limiter.allow("npub1alice"));
        assert!(limiter.allow("npub1bob"));
    }

    /// maxRequests=10, window=60m
    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, HOUR));

        for _ in 0..10 {
            assert!(limiter.allow("npub1alice"));
        }
        assert!(!limiter.allow("npub1alice"));

        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        assert!(limiter.allow("npub1alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_expiry_frees_exactly_one_slot() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(60)));

        assert!(limiter.allow("npub1alice"));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.allow("npub1alice"));
        assert!(limiter.allow("npub1alice"));
        assert!(!limiter.allow("npub1alice"));

        // 60s after the first request only that one ages out
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(limiter.allow("npub1alice"));
        assert!(!limiter.allow("npub1alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_requests_are_not_recorded() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));

        assert!(limiter.allow("npub1alice"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!limiter.allow("npub1alice"));

        // Had the rejection been recorded, this would still be blocked
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(limiter.allow("npub1alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_one_and_all() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, HOUR));
        assert!(limiter.allow("npub1alice"));
        assert!(limiter.allow("npub1bob"));

        limiter.reset("npub1alice");
        assert!(limiter.allow("npub1alice"));
        assert!(!limiter.allow("npub1bob"));

        limiter.reset_all();
        assert_eq!(limiter.tracked_identities(), 0);
        assert!(limiter.allow("npub1bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_identities() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, Duration::from_secs(60)));
        limiter.allow("npub1alice");
        limiter.allow("npub1bob");

        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.allow("npub1bob");
        assert_eq!(limiter.sweep_idle(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.sweep_idle(), 1);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_runs_on_schedule() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(5, Duration::from_secs(60)).with_cleanup_interval(3),
        );
        limiter.allow("npub1alice");
        limiter.allow("npub1bob");

        tokio::time::advance(Duration::from_secs(61)).await;
        // Third check triggers the sweep before admitting carol
        limiter.allow("npub1carol");
        assert_eq!(limiter.tracked_identities(), 1);
    }
}
