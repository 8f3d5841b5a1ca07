//! Model response cache
//!
//! Keyed by a fingerprint of `(model_id, prompt, params)`. There is no
//! backing file to re-validate, so entries live until TTL or LRU eviction.

use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::lru::LruMap;
use crate::{CacheConfig, CacheStats};

/// Extra request parameters (temperature, max_tokens, ...).
///
/// A `BTreeMap` iterates in key order, so insertion order never changes
/// the fingerprint.
pub type RequestParams = BTreeMap<String, Value>;

/// Hex SHA-256 over the full semantic input of a request.
///
/// Every field is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub fn fingerprint(model_id: &str, prompt: &str, params: &RequestParams) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, model_id.as_bytes());
    field(&mut hasher, prompt.as_bytes());
    hasher.update((params.len() as u64).to_le_bytes());
    for (name, value) in params {
        field(&mut hasher, name.as_bytes());
        field(&mut hasher, value.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Bounded, expiring cache of model responses
pub struct ResponseCache {
    entries: Mutex<LruMap<String>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(config.max_size, config.ttl())),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, model_id: &str, prompt: &str, params: &RequestParams) -> Option<String> {
        let key = fingerprint(model_id, prompt, params);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.purge_expired(now);

        match entries.get_mut(&key) {
            Some(slot) => {
                slot.last_access = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(model_id, "response cache hit");
                Some(slot.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a response. Empty responses are refused (returns `false`).
    pub fn put(
        &self,
        model_id: &str,
        prompt: &str,
        params: &RequestParams,
        response: impl Into<String>,
    ) -> bool {
        let response = response.into();
        if response.trim().is_empty() {
            debug!(model_id, "refusing to cache empty response");
            return false;
        }

        let key = fingerprint(model_id, prompt, params);
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.purge_expired(now);
        if let Some(evicted) = entries.insert(key, response, now) {
            trace!(%evicted, "response cache full, evicted least recently used");
        }
        self.config.max_size > 0
    }

    /// Return the cached response, or run `compute` and cache its result.
    ///
    /// Errors and empty responses pass through uncached. The lock is not
    /// held while `compute` runs, so two concurrent misses may both call it.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        model_id: &str,
        prompt: &str,
        params: &RequestParams,
        compute: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(cached) = self.get(model_id, prompt, params) {
            return Ok(cached);
        }
        let response = compute().await?;
        self.put(model_id, prompt, params, response.clone());
        Ok(response)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.config.max_size,
            ttl_seconds: self.config.ttl_seconds,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
