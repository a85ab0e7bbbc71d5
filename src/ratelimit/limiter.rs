//! Fixed-window rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::clock::{self, Clock, SystemClock};
use crate::error::{Result, TollgateError};
use crate::sweeper::Sweep;

use super::counter::{RateLimitDecision, RateLimitRecord};

/// Counts requests per identifier inside fixed windows.
///
/// Each identifier gets its own window, opened by its first request and
/// lasting `window`. Once the window ends the next request replaces the
/// record instead of adding to it. The limiter is thread-safe and meant
/// to be shared behind an `Arc`.
pub struct RateLimiter {
    /// Window state indexed by client identifier
    records: DashMap<String, RateLimitRecord>,
    /// Quota per window
    max_requests: u32,
    /// Length of every window
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter driven by the system clock.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, Arc::new(SystemClock))
    }

    /// Create a rate limiter that reads time from `clock`.
    pub fn with_clock(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            max_requests,
            window,
            clock,
        }
    }

    /// Count a request from `identifier` and decide whether it may proceed.
    ///
    /// A denied request does not touch the stored record.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let fresh = || RateLimitRecord::open(clock::add(now, self.window));

        trace!(identifier = %identifier, "Checking rate limit");

        let (allowed, record) = match self.records.entry(identifier.to_owned()) {
            Entry::Vacant(slot) => {
                let record = fresh();
                slot.insert(record);
                debug!(identifier = %identifier, reset_at = %record.reset_at, "Opened rate limit window");
                (true, record)
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if record.is_expired(now) {
                    *record = fresh();
                    debug!(identifier = %identifier, reset_at = %record.reset_at, "Opened rate limit window");
                    (true, *record)
                } else if record.count >= self.max_requests {
                    (false, *record)
                } else {
                    record.count += 1;
                    (true, *record)
                }
            }
        };

        if !allowed {
            warn!(
                identifier = %identifier,
                limit = self.max_requests,
                reset_at = %record.reset_at,
                "Rate limit exceeded"
            );
        }

        RateLimitDecision {
            allowed,
            remaining: if allowed {
                self.max_requests.saturating_sub(record.count)
            } else {
                0
            },
            reset_at: record.reset_at,
            limit: self.max_requests,
        }
    }

    /// Like [`check`](Self::check), but turns a denial into an error.
    pub fn enforce(&self, identifier: &str) -> Result<RateLimitDecision> {
        let decision = self.check(identifier);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(TollgateError::RateLimitExceeded {
                identifier: identifier.to_owned(),
                reset_at: decision.reset_at,
            })
        }
    }

    /// Drop every record whose window has ended.
    ///
    /// Returns how many records were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed = removed, "Rate limiter sweep completed");
        }
        removed
    }

    /// Snapshot of the record held for `identifier`, if any.
    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.records.get(identifier).map(|r| *r)
    }

    /// Quota per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of identifiers currently tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no identifier is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("records", &self.records.len())
            .finish()
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    fn sweep_expired(&self) -> usize {
        self.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const WINDOW: Duration = Duration::from_millis(60_000);

    fn limiter(max_requests: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::with_clock(max_requests, WINDOW, clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let (limiter, _) = limiter(5);
        assert!(limiter.is_empty());
        assert_eq!(limiter.max_requests(), 5);
        assert_eq!(limiter.window(), WINDOW);
    }

    #[test]
    fn test_first_request_opens_window() {
        let (limiter, clock) = limiter(5);

        let decision = limiter.check("10.0.0.1");

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.reset_at, clock::add(clock.now(), WINDOW));
        assert_eq!(limiter.record("10.0.0.1").map(|r| r.count), Some(1));
    }

    #[test]
    fn test_window_reset() {
        let (limiter, clock) = limiter(3);

        for _ in 0..3 {
            assert!(limiter.check("client").allowed);
        }
        let denied = limiter.check("client");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        clock.advance(WINDOW);

        let decision = limiter.check("client");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert!(decision.reset_at > denied.reset_at);
    }

    #[test]
    fn test_request_just_before_reset_is_denied() {
        let (limiter, clock) = limiter(1);

        limiter.check("client");
        clock.advance(WINDOW - Duration::from_millis(1));

        assert!(!limiter.check("client").allowed);
    }

    #[test]
    fn test_independent_identifiers() {
        let (limiter, _) = limiter(2);

        limiter.check("a");
        limiter.check("a");
        assert!(!limiter.check("a").allowed);

        let other = limiter.check("b");
        assert!(other.allowed);
        assert_eq!(other.remaining, 1);
    }

    #[test]
    fn test_monotonic_remaining() {
        let (limiter, _) = limiter(5);

        let remaining: Vec<u32> = (0..5).map(|_| limiter.check("client").remaining).collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = limiter.check("client");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_denied_request_does_not_mutate_record() {
        let (limiter, _) = limiter(2);

        limiter.check("client");
        limiter.check("client");
        let before = limiter.record("client");

        limiter.check("client");
        limiter.check("client");

        assert_eq!(limiter.record("client"), before);
        assert_eq!(before.map(|r| r.count), Some(2));
    }

    #[test]
    fn test_enforce() {
        let (limiter, _) = limiter(1);

        tokio_test::assert_ok!(limiter.enforce("client"));
        let err = tokio_test::assert_err!(limiter.enforce("client"));
        assert!(matches!(
            err,
            TollgateError::RateLimitExceeded { ref identifier, .. } if identifier == "client"
        ));
    }

    #[test]
    fn test_sweep_removes_only_expired_records() {
        let (limiter, clock) = limiter(5);

        limiter.check("old");
        clock.advance(Duration::from_millis(30_000));
        limiter.check("new");
        clock.advance(Duration::from_millis(30_000));

        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.record("old").is_none());
        assert!(limiter.record("new").is_some());

        // Nothing left to do
        assert_eq!(limiter.sweep(), 0);
    }

    #[test]
    fn test_sweep_on_empty_limiter() {
        let (limiter, _) = limiter(5);
        assert_eq!(limiter.sweep(), 0);
    }
}
