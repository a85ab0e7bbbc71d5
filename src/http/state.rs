//! Shared application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::JsonCache;
use crate::clock::Clock;
use crate::config::TollgateConfig;
use crate::ratelimit::RateLimiter;
use crate::sweeper::{spawn_sweeper, SweeperHandle};

/// Process-lifetime state handed to every handler and middleware.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Limit applied to all traffic
    pub global_limiter: Arc<RateLimiter>,
    /// Stricter limit for authentication endpoints
    pub auth_limiter: Arc<RateLimiter>,
    /// Shared memoization cache
    pub cache: Arc<JsonCache>,
    /// Origin allowed by CORS
    pub cors_origin: Option<String>,
    /// How often the cache is swept
    pub cache_cleanup_interval: Duration,
    started_at: Instant,
}

impl AppState {
    /// Build limiters and cache from configuration using the system clock.
    pub fn from_config(config: &TollgateConfig) -> Self {
        let limits = &config.rate_limiting;
        Self::assemble(
            RateLimiter::new(limits.global.max_requests, limits.global.window()),
            RateLimiter::new(limits.auth.max_requests, limits.auth.window()),
            JsonCache::new(config.cache.max_size).with_default_ttl(config.cache.default_ttl()),
            config,
        )
    }

    /// Build limiters and cache that all read time from `clock`.
    pub fn with_clock(config: &TollgateConfig, clock: Arc<dyn Clock>) -> Self {
        let limits = &config.rate_limiting;
        Self::assemble(
            RateLimiter::with_clock(limits.global.max_requests, limits.global.window(), clock.clone()),
            RateLimiter::with_clock(limits.auth.max_requests, limits.auth.window(), clock.clone()),
            JsonCache::with_clock(config.cache.max_size, clock)
                .with_default_ttl(config.cache.default_ttl()),
            config,
        )
    }

    fn assemble(
        global: RateLimiter,
        auth: RateLimiter,
        cache: JsonCache,
        config: &TollgateConfig,
    ) -> Self {
        Self {
            global_limiter: Arc::new(global),
            auth_limiter: Arc::new(auth),
            cache: Arc::new(cache),
            cors_origin: config.server.cors_origin.clone(),
            cache_cleanup_interval: config.cache.cleanup_interval(),
            started_at: Instant::now(),
        }
    }

    /// Start the background sweeps: each limiter every window, the cache on its interval.
    ///
    /// Sweeping stops when the returned handles are dropped.
    pub fn spawn_sweepers(&self) -> Vec<SweeperHandle> {
        vec![
            spawn_sweeper(&self.global_limiter, self.global_limiter.window()),
            spawn_sweeper(&self.auth_limiter, self.auth_limiter.window()),
            spawn_sweeper(&self.cache, self.cache_cleanup_interval),
        ]
    }

    /// Time since the state was built.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
