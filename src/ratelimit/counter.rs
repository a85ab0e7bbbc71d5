//! Per-identifier window state and the result of a limit check.

use chrono::{DateTime, Utc};

/// Requests seen from one identifier within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Requests counted in the current window
    pub count: u32,
    /// End of the current window
    pub reset_at: DateTime<Utc>,
}

impl RateLimitRecord {
    /// Open a fresh window holding the request that created it.
    pub fn open(reset_at: DateTime<Utc>) -> Self {
        Self { count: 1, reset_at }
    }

    /// Whether the window has ended at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// The outcome of [`RateLimiter::check`](super::RateLimiter::check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Quota left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
    /// The configured quota per window
    pub limit: u32,
}

impl RateLimitDecision {
    /// Render `reset_at` as an ISO-8601 timestamp with millisecond precision.
    pub fn reset_at_rfc3339(&self) -> String {
        self.reset_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}
