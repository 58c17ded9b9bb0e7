//! `CacheEntry` and the stats shape every cache backend reports (spec §3,
//! §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(key: String, value: V, ttl: chrono::Duration) -> Self {
        let created_at = Utc::now();
        Self {
            key,
            value,
            expires_at: created_at + ttl,
            created_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_with_no_requests_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_computes_correctly() {
        let mut stats = CacheStats::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let entry = CacheEntry::new("k".to_string(), 42, chrono::Duration::seconds(-1));
        assert!(entry.is_expired());
    }
}
