//! Per-device request rate limiting
//!
//! Every device gets at most `max_requests` accepted calls inside any
//! rolling `window`. Limiters fail closed: an internal error denies the
//! request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::prelude::RedisClient;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use stockwatch_store::TimeProvider;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Rate limiter backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
    pub backend: RateLimitBackend,
    /// Interval for dropping idle in-memory windows
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 60,
            backend: RateLimitBackend::Memory,
            prune_interval_secs: 300,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Record one attempt and report whether it is within the ceiling
    async fn allow(&self, device_id: &str) -> bool;

    /// Drop bookkeeping that can no longer affect a decision
    async fn prune(&self) {}
}

/// In-process sliding window over accepted request timestamps
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<i64>>,
    window_ms: i64,
    max_requests: usize,
    clock: Arc<dyn TimeProvider>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: u32, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            windows: DashMap::new(),
            window_ms: window.as_millis() as i64,
            max_requests: max_requests as usize,
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn TimeProvider>) -> Self {
        Self::new(
            Duration::from_secs(config.window_secs),
            config.max_requests,
            clock,
        )
    }

    /// Number of devices with tracked windows
    pub fn tracked_devices(&self) -> usize {
        self.windows.len()
    }

    fn evict_expired(window: &mut VecDeque<i64>, now: i64, window_ms: i64) {
        while window.front().is_some_and(|&at| now - at >= window_ms) {
            window.pop_front();
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, device_id: &str) -> bool {
        let now = self.clock.now_millis();
        // The entry guard holds the shard lock, so check-and-record is atomic per device
        let mut window = self.windows.entry(device_id.to_string()).or_default();
        Self::evict_expired(&mut window, now, self.window_ms);

        if window.len() >= self.max_requests {
            debug!("Rate limit reached for device {}", device_id);
            return false;
        }
        window.push_back(now);
        true
    }

    async fn prune(&self) {
        let now = self.clock.now_millis();
        let window_ms = self.window_ms;
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            Self::evict_expired(window, now, window_ms);
            !window.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Pruned {} idle rate limit windows", removed);
        }
    }
}

/// Shared fixed-window counter in Redis for multi-instance deployments
///
/// Counts live under `{prefix}:ratelimit:{device}:{window index}` and expire
/// with the window. Any Redis error denies the request.
pub struct RedisWindowLimiter {
    client: Arc<RedisClient>,
    prefix: String,
    window_secs: u64,
    max_requests: u32,
    clock: Arc<dyn TimeProvider>,
}

impl RedisWindowLimiter {
    pub fn new(
        client: Arc<RedisClient>,
        prefix: impl Into<String>,
        config: &RateLimitConfig,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            window_secs: config.window_secs.max(1),
            max_requests: config.max_requests,
            clock,
        }
    }

    fn key(&self, device_id: &str) -> String {
        let index = self.clock.now().timestamp() as u64 / self.window_secs;
        format!("{}:ratelimit:{}:{}", self.prefix, device_id, index)
    }
}

#[async_trait]
impl RateLimiter for RedisWindowLimiter {
    async fn allow(&self, device_id: &str) -> bool {
        let key = self.key(device_id);
        match self.client.incr_with_expiry(&key, self.window_secs).await {
            Ok(count) => count <= i64::from(self.max_requests),
            Err(e) => {
                warn!("Rate limiter unavailable, denying {}: {}", device_id, e);
                false
            },
        }
    }
}

/// Periodically prune idle windows until cancelled
pub fn start_prune_task(
    limiter: Arc<dyn RateLimiter>,
    interval: Duration,
) -> (JoinHandle<()>, CancellationToken) {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => limiter.prune().await,
                () = task_token.cancelled() => {
                    info!("Rate limit prune task stopped");
                    break;
                }
            }
        }
    });

    (handle, token)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockwatch_store::ManualTimeProvider;

    fn limiter(clock: Arc<ManualTimeProvider>) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(Duration::from_secs(60), 60, clock)
    }

    fn clock() -> Arc<ManualTimeProvider> {
        Arc::new(ManualTimeProvider::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_sixty_per_minute_ceiling() {
        let clock = clock();
        let limiter = limiter(clock.clone());

        for i in 0..60 {
            assert!(limiter.allow("dev-1").await, "request {} denied", i);
            clock.advance(chrono::Duration::milliseconds(100));
        }
        assert!(!limiter.allow("dev-1").await);
        // Other devices have their own budget
        assert!(limiter.allow("dev-2").await);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let clock = clock();
        let limiter = limiter(clock.clone());

        for _ in 0..30 {
            assert!(limiter.allow("dev-1").await);
        }
        clock.advance(chrono::Duration::seconds(30));
        for _ in 0..30 {
            assert!(limiter.allow("dev-1").await);
        }
        assert!(!limiter.allow("dev-1").await);

        // First batch ages out at exactly one window
        clock.advance(chrono::Duration::seconds(30));
        for _ in 0..30 {
            assert!(limiter.allow("dev-1").await);
        }
        assert!(!limiter.allow("dev-1").await);
    }

    #[tokio::test]
    async fn test_denied_requests_do_not_consume_budget() {
        let clock = clock();
        let limiter = limiter(clock.clone());

        for _ in 0..60 {
            limiter.allow("dev-1").await;
        }
        for _ in 0..100 {
            assert!(!limiter.allow("dev-1").await);
        }
        clock.advance(chrono::Duration::seconds(60));
        assert!(limiter.allow("dev-1").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_respect_ceiling() {
        let clock = clock();
        let limiter = Arc::new(limiter(clock));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let mut accepted = 0;
                for _ in 0..25 {
                    if limiter.allow("dev-1").await {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 60);
    }

    #[tokio::test]
    async fn test_prune_drops_idle_devices() {
        let clock = clock();
        let limiter = limiter(clock.clone());

        limiter.allow("dev-1").await;
        limiter.allow("dev-2").await;
        clock.advance(chrono::Duration::seconds(30));
        limiter.allow("dev-2").await;
        clock.advance(chrono::Duration::seconds(31));

        limiter.prune().await;
        assert_eq!(limiter.tracked_devices(), 1);
    }
}
