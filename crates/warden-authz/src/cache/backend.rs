//! Cache backend: per-instance DashMap or shared Redis.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::config::{CacheBackendKind, CacheConfig};

use super::CacheError;

const SCAN_BATCH: usize = 200;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Storage tier behind the edge permission cache.
///
/// - **Local**: single instance, entries live in a DashMap
/// - **Redis**: shared across instances; every call is bounded by `timeout`
///
/// There is no local L1 in front of Redis: an L1 entry would survive a
/// prefix invalidation issued by another instance.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: shared Redis
    Redis { pool: Pool, timeout: Duration },
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(pool: Pool, timeout: Duration) -> Self {
        CacheBackend::Redis { pool, timeout }
    }

    /// Create a cache backend from configuration.
    ///
    /// If the Redis pool cannot be built or the first connection fails, the
    /// backend falls back to local mode so the service can still start.
    pub async fn connect(config: &CacheConfig) -> Self {
        let url = match (config.backend, config.redis_url.as_deref()) {
            (CacheBackendKind::Redis, Some(url)) => url,
            (CacheBackendKind::Redis, None) => {
                tracing::warn!("Redis backend selected without redis_url, using local cache");
                return Self::new_local();
            }
            (CacheBackendKind::Local, _) => {
                tracing::info!("Using local permission cache");
                return Self::new_local();
            }
        };

        tracing::info!(url = %url, "Connecting to Redis");

        let mut redis_config = deadpool_redis::Config::from_url(url);
        let mut pool_config = deadpool_redis::PoolConfig::new(config.redis_pool_size);
        pool_config.timeouts.wait = Some(config.operation_timeout);
        pool_config.timeouts.create = Some(config.operation_timeout);
        pool_config.timeouts.recycle = Some(config.operation_timeout);
        redis_config.pool = Some(pool_config);

        let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to create Redis pool. Falling back to local cache."
                );
                return Self::new_local();
            }
        };

        match pool.get().await {
            Ok(_) => {
                tracing::info!("Connected to Redis");
                Self::new_redis(pool, config.operation_timeout)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to local cache."
                );
                Self::new_local()
            }
        }
    }

    /// Get a value from the cache. Expired local entries read as absent.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let Some(entry) = map.get(key) else {
                    return Ok(None);
                };
                if entry.is_expired() {
                    drop(entry);
                    map.remove(key);
                    return Ok(None);
                }
                Ok(Some(Arc::clone(&entry.data)))
            }
            CacheBackend::Redis { pool, timeout } => {
                bounded(*timeout, "get", async {
                    let mut conn = pool.get().await?;
                    let data: Option<Vec<u8>> = conn.get(key).await?;
                    Ok::<_, CacheError>(data.map(Arc::new))
                })
                .await
            }
        }
    }

    /// Set a value in the cache with TTL.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis { pool, timeout } => {
                let ttl_secs = ttl.as_secs().max(1);
                bounded(*timeout, "set", async {
                    let mut conn = pool.get().await?;
                    conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                    Ok::<_, CacheError>(())
                })
                .await
            }
        }
    }

    /// Remove a single entry.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                Ok(())
            }
            CacheBackend::Redis { pool, timeout } => {
                bounded(*timeout, "delete", async {
                    let mut conn = pool.get().await?;
                    conn.del::<_, ()>(key).await?;
                    Ok::<_, CacheError>(())
                })
                .await
            }
        }
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many
    /// entries were removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let keys: Vec<String> = map
                    .iter()
                    .filter(|entry| entry.key().starts_with(prefix))
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in &keys {
                    map.remove(key);
                }
                Ok(keys.len())
            }
            CacheBackend::Redis { pool, timeout } => {
                let pattern = format!("{}*", escape_glob(prefix));
                bounded(*timeout, "delete_prefix", async {
                    let mut conn = pool.get().await?;
                    let mut cursor: u64 = 0;
                    let mut removed = 0;
                    loop {
                        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(SCAN_BATCH)
                            .query_async(&mut conn)
                            .await?;
                        if !keys.is_empty() {
                            let deleted: usize = conn.del(&keys).await?;
                            removed += deleted;
                        }
                        if next == 0 {
                            break;
                        }
                        cursor = next;
                    }
                    Ok::<_, CacheError>(removed)
                })
                .await
            }
        }
    }

    /// Drop expired local entries. Redis expires keys on its own.
    pub fn cleanup_expired(&self) -> usize {
        match self {
            CacheBackend::Local(map) => {
                let before = map.len();
                map.retain(|_, entry| !entry.is_expired());
                before.saturating_sub(map.len())
            }
            CacheBackend::Redis { .. } => 0,
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> BackendStats {
        match self {
            CacheBackend::Local(map) => BackendStats {
                local_entries: map.len(),
                mode: "local",
            },
            CacheBackend::Redis { .. } => BackendStats {
                local_entries: 0,
                mode: "redis",
            },
        }
    }

    /// Check if Redis is reachable (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { pool, timeout } => {
                bounded(*timeout, "ping", async {
                    pool.get().await?;
                    Ok::<_, CacheError>(())
                })
                .await
                .is_ok()
            }
        }
    }
}

/// Backend statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendStats {
    pub local_entries: usize,
    pub mode: &'static str,
}

async fn bounded<T, F>(limit: Duration, operation: &'static str, future: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| CacheError::Timeout { operation })?
}

/// Escapes Redis glob metacharacters so a key prefix matches literally.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_get_set() {
        let backend = CacheBackend::new_local();
        assert!(backend.get("k").await.unwrap().is_none());

        backend
            .set("k", vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let data = backend.get("k").await.unwrap().unwrap();
        assert_eq!(data.as_slice(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_local_expired_entry_reads_as_miss() {
        let backend = CacheBackend::new_local();
        backend.set("k", vec![1], Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.stats().local_entries, 0);
    }

    #[tokio::test]
    async fn test_local_delete_prefix() {
        let backend = CacheBackend::new_local();
        let ttl = Duration::from_secs(60);
        backend.set("permissions:a:acme:1", vec![1], ttl).await.unwrap();
        backend.set("permissions:a:acme:2", vec![2], ttl).await.unwrap();
        backend.set("permissions:a:other:2", vec![3], ttl).await.unwrap();
        backend.set("permissions:b:acme:1", vec![4], ttl).await.unwrap();

        let removed = backend.delete_prefix("permissions:a:acme:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(backend.get("permissions:a:other:2").await.unwrap().is_some());
        assert!(backend.get("permissions:b:acme:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let backend = CacheBackend::new_local();
        backend.set("old", vec![1], Duration::ZERO).await.unwrap();
        backend
            .set("fresh", vec![2], Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(backend.cleanup_expired(), 1);
        assert_eq!(backend.stats().local_entries, 1);
        assert_eq!(backend.stats().mode, "local");
    }

    #[tokio::test]
    async fn test_connect_local() {
        let backend = CacheBackend::connect(&CacheConfig::default()).await;
        assert!(matches!(backend, CacheBackend::Local(_)));
        assert!(!backend.is_redis_available().await);
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("permissions:a:t:"), "permissions:a:t:");
        assert_eq!(escape_glob("p:a:t[1]*:"), "p:a:t\\[1\\]\\*:");
    }
}
