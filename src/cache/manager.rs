//! `CacheManager`: the namespaced, two-tier cache facade every stage goes
//! through (spec §4.1). Memory is consulted first; a miss falls through to
//! the distributed backend and, on a hit there, repopulates memory.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::cache::CacheStats;

use super::memory::MemoryCache;
use super::redis_backend::RedisCache;

/// Builds the namespaced key spec §3 describes: `md5(category:arg1:arg2:...)`
/// as a hex string, bounding key length and preventing one category's keys
/// from colliding with another's.
pub fn fingerprint(category: &str, parts: &[&str]) -> String {
    let mut joined = category.to_string();
    for part in parts {
        joined.push(':');
        joined.push_str(part);
    }
    format!("{:x}", md5::compute(joined.as_bytes()))
}

pub struct CacheManager {
    memory: Mutex<MemoryCache>,
    redis: RedisCache,
    key_prefix: String,
}

impl CacheManager {
    pub fn new(config: &CacheConfig, key_prefix: impl Into<String>) -> Result<Self> {
        Ok(Self {
            memory: Mutex::new(MemoryCache::new(config.memory_max_size)),
            redis: RedisCache::new(&config.redis_url)?,
            key_prefix: key_prefix.into(),
        })
    }

    fn full_key(&self, category: &str, parts: &[&str]) -> String {
        format!("{}{}:{}", self.key_prefix, category, fingerprint(category, parts))
    }

    pub async fn get<T: DeserializeOwned>(&self, category: &str, parts: &[&str]) -> Option<T> {
        let key = self.full_key(category, parts);
        {
            let mut memory = self.memory.lock().await;
            if let Some(bytes) = memory.get(&key) {
                return serde_json::from_slice(&bytes).ok();
            }
        }
        let bytes = self.redis.get(&key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Per spec §4.1, a distributed-backend failure degrades writes to a
    /// no-op rather than propagating: the memory tier above already has
    /// the value, so the only loss is cross-process visibility.
    pub async fn set<T: Serialize>(
        &self,
        category: &str,
        parts: &[&str],
        value: &T,
        ttl: chrono::Duration,
    ) -> Result<()> {
        let key = self.full_key(category, parts);
        let bytes = serde_json::to_vec(value)?;
        {
            let mut memory = self.memory.lock().await;
            memory.set(key.clone(), bytes.clone(), ttl);
        }
        let ttl_seconds = ttl.num_seconds().max(0) as u64;
        if let Err(err) = self.redis.set(&key, &bytes, ttl_seconds).await {
            warn!(error = %err, category, "redis SET failed, write degraded to memory-only");
        }
        Ok(())
    }

    pub async fn delete(&self, category: &str, parts: &[&str]) -> Result<bool> {
        let key = self.full_key(category, parts);
        let memory_hit = {
            let mut memory = self.memory.lock().await;
            memory.delete(&key)
        };
        let redis_hit = self.redis.delete(&key).await?;
        Ok(memory_hit || redis_hit)
    }

    pub async fn exists(&self, category: &str, parts: &[&str]) -> Result<bool> {
        let key = self.full_key(category, parts);
        if self.memory.lock().await.exists(&key) {
            return Ok(true);
        }
        self.redis.exists(&key).await
    }

    /// Clears only the memory tier: the distributed backend has no
    /// category-scoped scan in this client and clearing it outright would
    /// affect every other process sharing the Redis instance.
    pub async fn clear_memory(&self) {
        self.memory.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.memory.lock().await.stats().clone()
    }

    /// Get-or-compute-and-set: on a miss, runs `fetch` and stores its
    /// result before returning it. Grounded on the original's
    /// `cache.get_or_set` helper, used by Background Tasks (§4.14) and by
    /// every per-category cache helper below.
    pub async fn warm<T, F, Fut>(
        &self,
        category: &str,
        parts: &[&str],
        ttl: chrono::Duration,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get::<T>(category, parts).await {
            debug!(category, "cache warm: hit");
            return Ok(cached);
        }
        let value = fetch().await?;
        self.set(category, parts, &value, ttl).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let a = fingerprint("user_profile", &["user1"]);
        let b = fingerprint("user_profile", &["user1"]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_categories() {
        let a = fingerprint("user_profile", &["user1"]);
        let b = fingerprint("top_tracks", &["user1"]);
        assert_ne!(a, b);
    }
}
