//! Speckeep Cache - bounded in-memory caches
//!
//! Two caches share one eviction model: entries expire `ttl_seconds` after
//! their last access, and a full cache evicts exactly one entry, the least
//! recently accessed, before inserting.
//!
//! - [`FileCache`] holds decoded file contents and re-validates them against
//!   the file's mtime and size on every hit.
//! - [`ResponseCache`] holds model responses keyed by a request fingerprint.
//!
//! Each cache guards its state with a single mutex; nothing inside the lock
//! blocks except the `stat` call in [`FileCache::get`].

mod clock;
mod file_cache;
mod lru;
mod response_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file_cache::{FileCache, FileStamp};
pub use response_cache::{fingerprint, RequestParams, ResponseCache};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capacity and expiry for one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    pub const fn new(max_size: usize, ttl_seconds: u64) -> Self {
        Self { max_size, ttl_seconds }
    }

    /// 100 files for 5 minutes
    pub const fn file_default() -> Self {
        Self::new(100, 300)
    }

    /// 50 responses for 1 hour
    pub const fn response_default() -> Self {
        Self::new(50, 3600)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Point-in-time view of a cache, for health endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate (0.0-1.0). Returns 0.0 if no lookups yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
