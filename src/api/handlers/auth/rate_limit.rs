//! Fixed-window rate limiting for auth flows.
//!
//! Buckets are keyed by `(key, class)`; the key is typically the client IP.
//! Windows are fixed rather than sliding, which allows up to 2x the limit
//! across a window boundary. The limiter is handed to callers as a trait
//! object so tests and trusted deployments can substitute `NoopRateLimiter`.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Request classes with independent budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitClass {
    Login,
    Register,
    PasswordReset,
    ChatMessage,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitClass {
    #[must_use]
    pub const fn config(self) -> RateLimitConfig {
        match self {
            Self::Login => RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(15 * 60),
            },
            Self::Register => RateLimitConfig {
                max_requests: 3,
                window: Duration::from_secs(60 * 60),
            },
            Self::PasswordReset => RateLimitConfig {
                max_requests: 3,
                window: Duration::from_secs(60 * 60),
            },
            Self::ChatMessage => RateLimitConfig {
                max_requests: 60,
                window: Duration::from_secs(60),
            },
            Self::Default => RateLimitConfig {
                max_requests: 100,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// Outcome of a single check. `retry_after` is only set on denial, rounded
/// up to whole seconds for the `Retry-After` header.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after: Option<u64>,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str, class: RateLimitClass) -> RateLimitResult;
    fn reset(&self, key: &str, class: RateLimitClass);
}

#[derive(Clone, Copy, Debug)]
struct Bucket {
    count: u32,
    window_start: Instant,
    window_start_utc: DateTime<Utc>,
}

/// In-process fixed-window limiter.
pub struct FixedWindowRateLimiter {
    buckets: Mutex<HashMap<(String, RateLimitClass), Bucket>>,
    overrides: HashMap<RateLimitClass, RateLimitConfig>,
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            overrides: HashMap::new(),
        }
    }

    /// Replace the budget for one class, for tests and tuning.
    #[must_use]
    pub fn with_config(mut self, class: RateLimitClass, config: RateLimitConfig) -> Self {
        self.overrides.insert(class, config);
        self
    }

    fn config_for(&self, class: RateLimitClass) -> RateLimitConfig {
        self.overrides
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.config())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, RateLimitClass), Bucket>> {
        // Counters are advisory; a poisoned map is still usable.
        self.buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Drop buckets idle for at least twice their window.
    pub fn purge_stale(&self) {
        let now = Instant::now();
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|(_, class), bucket| {
            let window = self
                .overrides
                .get(class)
                .copied()
                .unwrap_or_else(|| class.config())
                .window;
            now.duration_since(bucket.window_start) < window * 2
        });
        let purged = before - buckets.len();
        if purged > 0 {
            debug!(purged, remaining = buckets.len(), "purged stale rate limit buckets");
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, key: &str, class: RateLimitClass) -> RateLimitResult {
        let config = self.config_for(class);
        let now = Instant::now();
        let now_utc = Utc::now();
        let mut buckets = self.lock();
        let bucket = buckets
            .entry((key.to_string(), class))
            .or_insert(Bucket {
                count: 0,
                window_start: now,
                window_start_utc: now_utc,
            });

        if now.duration_since(bucket.window_start) >= config.window {
            bucket.count = 0;
            bucket.window_start = now;
            bucket.window_start_utc = now_utc;
        }

        let window_secs = i64::try_from(config.window.as_secs()).unwrap_or(i64::MAX);
        let reset_at = bucket.window_start_utc + chrono::Duration::seconds(window_secs);

        if bucket.count >= config.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            let left = config.window.saturating_sub(elapsed);
            let retry_after = left.as_millis().div_ceil(1000);
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at,
                retry_after: Some(u64::try_from(retry_after).unwrap_or(u64::MAX)),
            };
        }

        bucket.count += 1;
        RateLimitResult {
            allowed: true,
            remaining: config.max_requests - bucket.count,
            reset_at,
            retry_after: None,
        }
    }

    fn reset(&self, key: &str, class: RateLimitClass) {
        self.lock().remove(&(key.to_string(), class));
    }
}

/// Spawn a background task that periodically drops stale buckets.
pub fn spawn_purge_task(
    limiter: std::sync::Arc<FixedWindowRateLimiter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.purge_stale();
        }
    })
}

/// Limiter that always allows, for tests and trusted paths.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: &str, class: RateLimitClass) -> RateLimitResult {
        let config = class.config();
        RateLimitResult {
            allowed: true,
            remaining: config.max_requests,
            reset_at: Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
            retry_after: None,
        }
    }

    fn reset(&self, _key: &str, _class: RateLimitClass) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        let result = limiter.check("10.0.0.1", RateLimitClass::Login);
        assert!(result.allowed);
        assert!(result.retry_after.is_none());
    }

    #[test]
    fn limit_denies_after_budget() {
        let limiter = FixedWindowRateLimiter::new();
        for n in (0..5).rev() {
            let result = limiter.check("10.0.0.1", RateLimitClass::Login);
            assert!(result.allowed);
            assert_eq!(result.remaining, n);
        }
        let result = limiter.check("10.0.0.1", RateLimitClass::Login);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        let retry = result.retry_after.unwrap();
        assert!(retry >= 1 && retry <= 15 * 60, "retry_after {retry}");
    }

    #[test]
    fn keys_and_classes_are_independent() {
        let limiter = FixedWindowRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("10.0.0.1", RateLimitClass::Login).allowed);
        }
        assert!(!limiter.check("10.0.0.1", RateLimitClass::Login).allowed);
        assert!(limiter.check("10.0.0.2", RateLimitClass::Login).allowed);
        assert!(limiter.check("10.0.0.1", RateLimitClass::PasswordReset).allowed);
    }

    #[test]
    fn window_elapse_resets_count() {
        let limiter = FixedWindowRateLimiter::new().with_config(
            RateLimitClass::Login,
            RateLimitConfig {
                max_requests: 1,
                window: Duration::from_millis(0),
            },
        );
        assert!(limiter.check("k", RateLimitClass::Login).allowed);
        // zero-length window: every check starts a fresh window
        assert!(limiter.check("k", RateLimitClass::Login).allowed);
    }

    #[test]
    fn reset_clears_bucket() {
        let limiter = FixedWindowRateLimiter::new();
        for _ in 0..5 {
            limiter.check("10.0.0.1", RateLimitClass::Login);
        }
        assert!(!limiter.check("10.0.0.1", RateLimitClass::Login).allowed);
        limiter.reset("10.0.0.1", RateLimitClass::Login);
        assert!(limiter.check("10.0.0.1", RateLimitClass::Login).allowed);
    }

    #[test]
    fn purge_drops_stale_buckets_only() {
        let limiter = FixedWindowRateLimiter::new().with_config(
            RateLimitClass::ChatMessage,
            RateLimitConfig {
                max_requests: 10,
                window: Duration::from_millis(0),
            },
        );
        limiter.check("stale", RateLimitClass::ChatMessage);
        limiter.check("fresh", RateLimitClass::Login);
        limiter.purge_stale();
        let buckets = limiter.lock();
        assert!(!buckets.contains_key(&("stale".to_string(), RateLimitClass::ChatMessage)));
        assert!(buckets.contains_key(&("fresh".to_string(), RateLimitClass::Login)));
    }
}
