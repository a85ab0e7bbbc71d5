//! In-memory caching with per-entry expiry.

mod json;
mod stats;
mod store;

pub use json::JsonCache;
pub use stats::CacheStats;
pub use store::{ExpiringCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
