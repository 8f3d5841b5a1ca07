//! Shared TTL + evict-one-LRU bookkeeping

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub(crate) struct Slot<V> {
    pub value: V,
    pub last_access: Instant,
}

pub(crate) struct LruMap<V> {
    entries: HashMap<String, Slot<V>>,
    max_size: usize,
    ttl: Duration,
}

impl<V> LruMap<V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every entry idle for longer than the TTL. Returns how many went.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, slot| now.saturating_duration_since(slot.last_access) <= ttl);
        before - self.entries.len()
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Slot<V>> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Insert or overwrite. A new key in a full map evicts the single
    /// least-recently-accessed entry first. Returns the evicted key.
    pub fn insert(&mut self, key: String, value: V, now: Instant) -> Option<String> {
        if self.max_size == 0 {
            return None;
        }

        let mut evicted = None;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        self.entries.insert(
            key,
            Slot {
                value,
                last_access: now,
            },
        );
        evicted
    }
}
