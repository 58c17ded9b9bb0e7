//! In-process LRU cache backend (spec §4.1): the fast path consulted
//! before the distributed backend, with lazy expiry and bulk eviction on
//! overflow.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::cache::CacheStats;

struct Slot {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

/// A bounded map keyed by the fully-namespaced cache key
/// (`{category}:{md5 fingerprint}`), storing pre-serialized bytes so the
/// backend stays value-type agnostic the way the distributed backend is.
pub struct MemoryCache {
    entries: HashMap<String, Slot>,
    max_size: usize,
    stats: CacheStats,
}

impl MemoryCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(slot) => Utc::now() >= slot.expires_at,
            None => {
                self.stats.record_miss();
                return None;
            }
        };
        if expired {
            self.entries.remove(key);
            self.stats.record_miss();
            return None;
        }
        let slot = self.entries.get_mut(key).expect("checked above");
        slot.last_used = Utc::now();
        self.stats.record_hit();
        Some(slot.value.clone())
    }

    pub fn set(&mut self, key: String, value: Vec<u8>, ttl: chrono::Duration) {
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict_lru((self.max_size / 10).max(1));
        }
        let now = Utc::now();
        self.entries.insert(
            key,
            Slot {
                value,
                expires_at: now + ttl,
                last_used: now,
            },
        );
        self.stats.record_set();
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|slot| Utc::now() < slot.expires_at)
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Evicts the `count` least-recently-used entries. Spec §4.1 sizes
    /// this at 10% of capacity per overflow so a single eviction pass
    /// buys room for several subsequent inserts, not just one.
    fn evict_lru(&mut self, count: usize) {
        let mut keys: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|(k, slot)| (k.clone(), slot.last_used))
            .collect();
        keys.sort_by_key(|(_, last_used)| *last_used);
        for (key, _) in keys.into_iter().take(count) {
            self.entries.remove(&key);
            self.stats.record_eviction();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set_is_a_hit() {
        let mut cache = MemoryCache::new(10);
        cache.set("k".to_string(), b"v".to_vec(), chrono::Duration::seconds(60));
        assert_eq!(cache.get("k"), Some(b"v".to_vec()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let mut cache = MemoryCache::new(10);
        cache.set("k".to_string(), b"v".to_vec(), chrono::Duration::seconds(-1));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn overflow_evicts_roughly_ten_percent() {
        let mut cache = MemoryCache::new(10);
        for i in 0..10 {
            cache.set(format!("k{i}"), b"v".to_vec(), chrono::Duration::seconds(60));
        }
        cache.set("k10".to_string(), b"v".to_vec(), chrono::Duration::seconds(60));
        assert!(cache.len() <= 10);
        assert!(cache.stats().evictions >= 1);
    }
}
