//! Bounded in-memory cache with per-entry expiry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::stats::CacheStats;
use crate::clock::{self, Clock, SystemClock};
use crate::sweeper::Sweep;

/// Entry limit used by [`ExpiringCache::default`].
pub const DEFAULT_MAX_SIZE: usize = 1000;
/// Time-to-live used by [`ExpiringCache::set_default`] unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_millis(60_000);

struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
    /// Position in insertion order
    seq: u64,
}

/// Entries plus an index of their insertion order.
struct Store<V> {
    entries: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Store<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot)
    }

    /// Remove the entry inserted earliest among those still present.
    fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// A key-value cache whose entries expire after a per-entry TTL.
///
/// When full, inserting evicts the oldest surviving insert. Overwriting a
/// key keeps its original position in that order. Expired entries are
/// dropped lazily on [`get`](Self::get) and in bulk by
/// [`cleanup`](Self::cleanup).
pub struct ExpiringCache<V> {
    store: Mutex<Store<V>>,
    max_size: usize,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create a cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self::with_clock(max_size, Arc::new(SystemClock))
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(max_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(Store::new()),
            max_size,
            default_ttl: DEFAULT_TTL,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Use `ttl` for entries stored through [`set_default`](Self::set_default).
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// The capacity check runs before the write, so a full cache evicts its
    /// oldest entry even when `key` is already present.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at = clock::add(self.clock.now(), ttl);
        let mut guard = self.store.lock();
        let store = &mut *guard;

        if store.entries.len() >= self.max_size {
            if let Some(evicted) = store.pop_oldest() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "Cache evicted");
            }
        }

        match store.entries.get_mut(&key) {
            Some(slot) => {
                slot.value = value;
                slot.expires_at = expires_at;
            }
            None => {
                let seq = store.next_seq;
                store.next_seq += 1;
                store.order.insert(seq, key.clone());
                store.entries.insert(
                    key.clone(),
                    Slot {
                        value,
                        expires_at,
                        seq,
                    },
                );
            }
        }

        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache set");
    }

    /// Store `value` under `key` for the cache's default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Fetch a live value, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut store = self.store.lock();

        let Some(slot) = store.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache miss");
            return None;
        };

        if now >= slot.expires_at {
            store.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache expired");
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache hit");
        Some(slot.value.clone())
    }

    /// Remove `key`, reporting whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let deleted = self.store.lock().remove(key).is_some();
        if deleted {
            debug!(key = %key, "Cache deleted");
        }
        deleted
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut store = self.store.lock();
        store.entries.clear();
        store.order.clear();
        debug!("Cache cleared");
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut store = self.store.lock();

        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, slot)| now >= slot.expires_at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove(key);
        }

        let cleaned = expired.len();
        if cleaned > 0 {
            self.expirations.fetch_add(cleaned as u64, Ordering::Relaxed);
            debug!(cleaned = cleaned, "Cache cleanup completed");
        }
        cleaned
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity beyond which inserts evict.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// TTL applied by [`set_default`](Self::set_default).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Counters accumulated since the cache was created.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.len(),
            max_size: self.max_size,
        }
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("len", &self.store.lock().entries.len())
            .finish()
    }
}

impl<V: Clone + Send + 'static> Sweep for ExpiringCache<V> {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn sweep_expired(&self) -> usize {
        self.cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(max_size: usize) -> (ExpiringCache<i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (ExpiringCache::with_clock(max_size, clock.clone()), clock)
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache(10);
        cache.set_default("answer", 42);
        assert_eq!(cache.get("answer"), Some(42));
        assert_eq!(cache.get("question"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock) = cache(10);
        cache.set("k", 7, Duration::from_millis(10));

        clock.advance(Duration::from_millis(9));
        assert_eq!(cache.get("k"), Some(7));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);

        // The expired read removed the entry
        assert!(!cache.delete("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_configured_default_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache: ExpiringCache<i32> = ExpiringCache::with_clock(10, clock.clone())
            .with_default_ttl(Duration::from_secs(5));

        cache.set_default("k", 1);
        clock.advance(Duration::from_secs(4));
        assert_eq!(cache.get("k"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_capacity_eviction() {
        let (cache, _) = cache(2);
        cache.set_default("a", 1);
        cache.set_default("b", 2);
        cache.set_default("c", 3);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_skips_deleted_keys() {
        let (cache, _) = cache(2);
        cache.set_default("a", 1);
        cache.set_default("b", 2);
        cache.delete("a");
        cache.set_default("c", 3);
        cache.set_default("d", 4);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_overwrite_keeps_insertion_position() {
        let (cache, _) = cache(3);
        cache.set_default("a", 1);
        cache.set_default("b", 2);
        cache.set_default("a", 10);
        cache.set_default("c", 3);

        // Full: the next insert evicts "a", which was inserted first
        cache.set_default("d", 4);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_overwrite_when_full_still_evicts() {
        let (cache, _) = cache(2);
        cache.set_default("a", 1);
        cache.set_default("b", 2);

        cache.set_default("b", 20);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(20));
    }

    #[test]
    fn test_overwrite_refreshes_ttl() {
        let (cache, clock) = cache(10);
        cache.set("k", 1, Duration::from_millis(10));
        clock.advance(Duration::from_millis(8));
        cache.set("k", 2, Duration::from_millis(10));
        clock.advance(Duration::from_millis(8));

        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_delete_and_clear_are_idempotent() {
        let (cache, _) = cache(10);
        assert!(!cache.delete("missing"));

        cache.clear();
        assert!(cache.is_empty());

        cache.set_default("a", 1);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));

        cache.set_default("b", 2);
        cache.clear();
        assert_eq!(cache.get("b"), None);
        assert!(!cache.delete("b"));
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let (cache, clock) = cache(10);
        cache.set("short", 1, Duration::from_millis(100));
        cache.set("long", 2, Duration::from_millis(1_000));

        clock.advance(Duration::from_millis(500));

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn test_stats() {
        let (cache, clock) = cache(10);
        cache.set("a", 1, Duration::from_millis(10));
        cache.get("a");
        cache.get("b");
        clock.advance(Duration::from_millis(10));
        cache.get("a");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_size, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_convergence() {
        use crate::sweeper::spawn_sweeper;

        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ExpiringCache::with_clock(100, clock.clone()));
        for i in 0..25 {
            cache.set(format!("key-{i}"), i, Duration::from_millis(5));
        }
        clock.advance(Duration::from_millis(5));

        let _sweeper = spawn_sweeper(&cache, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 25);
    }
}
