//! Cache backend with an L1 (DashMap) tier and an optional L2 (Redis) tier.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::pubsub::INVALIDATION_CHANNEL;

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
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Errors reported by the Redis tier.
///
/// The local tier never fails.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No connection could be taken from the pool.
    #[error("Redis pool error: {0}")]
    Pool(String),

    /// Redis did not answer within the command timeout.
    #[error("Redis {command} timed out for {key}")]
    Timeout { command: &'static str, key: String },

    /// A Redis command failed.
    #[error("Redis {command} failed for {key}: {message}")]
    Command {
        command: &'static str,
        key: String,
        message: String,
    },
}

/// Two-tier cache backend.
///
/// ## Cache Modes
///
/// - **Local**: single instance, DashMap only
/// - **Redis**: multiple instances, DashMap (L1) in front of Redis (L2).
///   Invalidations are published so peers drop their L1 copy.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: Redis + local L1
    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
        /// TTL given to entries promoted from L2.
        l1_ttl: Duration,
        /// Deadline for one Redis round trip, connection checkout included.
        command_timeout: Duration,
    },
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CacheBackend")
            .field("mode", &stats.mode)
            .field("l1_entries", &stats.l1_entries)
            .finish()
    }
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(redis_pool: Pool, l1_ttl: Duration, command_timeout: Duration) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
            l1_ttl,
            command_timeout,
        }
    }

    /// Get a value from the cache.
    ///
    /// Checks L1 first, then L2. A value found in L2 is promoted to L1.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` when Redis cannot be reached, does not answer
    /// within the command timeout, or the GET fails.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => Ok(get_local(map, key)),
            CacheBackend::Redis {
                redis,
                local,
                l1_ttl,
                command_timeout,
            } => {
                if let Some(data) = get_local(local, key) {
                    tracing::debug!(key = %key, "cache hit (L1)");
                    return Ok(Some(data));
                }

                let value = with_deadline(*command_timeout, "GET", key, async {
                    let mut conn = redis
                        .get()
                        .await
                        .map_err(|e| CacheError::Pool(e.to_string()))?;
                    conn.get::<_, Option<Vec<u8>>>(key)
                        .await
                        .map_err(|e| CacheError::Command {
                            command: "GET",
                            key: key.to_string(),
                            message: e.to_string(),
                        })
                })
                .await?;

                match value {
                    Some(data) => {
                        tracing::debug!(key = %key, "cache hit (L2)");
                        let entry = CachedEntry::new(data, *l1_ttl);
                        let data_arc = Arc::clone(&entry.data);
                        local.insert(key.to_string(), entry);
                        Ok(Some(data_arc))
                    }
                    None => {
                        tracing::debug!(key = %key, "cache miss");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Set a value in the cache with TTL.
    ///
    /// In Redis mode the L1 write is immediate and the L2 write is
    /// fire-and-forget; failures are logged.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
            }
            CacheBackend::Redis {
                redis,
                local,
                command_timeout,
                ..
            } => {
                let entry = CachedEntry::new(value, ttl);
                let data_for_redis = Arc::clone(&entry.data);
                local.insert(key.to_string(), entry);

                let redis = redis.clone();
                let key = key.to_string();
                let ttl_secs = ttl.as_secs().max(1);
                let deadline = *command_timeout;
                tokio::spawn(async move {
                    let result = with_deadline(deadline, "SET", &key, async {
                        let mut conn = redis
                            .get()
                            .await
                            .map_err(|e| CacheError::Pool(e.to_string()))?;
                        conn.set_ex::<_, _, ()>(&key, &*data_for_redis, ttl_secs)
                            .await
                            .map_err(|e| CacheError::Command {
                                command: "SET",
                                key: key.clone(),
                                message: e.to_string(),
                            })
                    })
                    .await;
                    match result {
                        Ok(()) => tracing::debug!(key = %key, ttl_secs, "cache set (L1+L2)"),
                        Err(e) => tracing::warn!(key = %key, error = %e, "Redis SET failed"),
                    }
                });
            }
        }
    }

    /// Invalidate a cache entry.
    ///
    /// In Redis mode the key is removed from L1 and L2, then the invalidation
    /// is published to other instances.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if Redis could not be updated. L1 is cleared
    /// regardless.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                tracing::debug!(key = %key, "cache invalidated (local)");
                Ok(())
            }
            CacheBackend::Redis {
                redis,
                local,
                command_timeout,
                ..
            } => {
                local.remove(key);

                with_deadline(*command_timeout, "DEL", key, async {
                    let mut conn = redis
                        .get()
                        .await
                        .map_err(|e| CacheError::Pool(e.to_string()))?;

                    conn.del::<_, ()>(key)
                        .await
                        .map_err(|e| CacheError::Command {
                            command: "DEL",
                            key: key.to_string(),
                            message: e.to_string(),
                        })?;

                    conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, key)
                        .await
                        .map_err(|e| CacheError::Command {
                            command: "PUBLISH",
                            key: key.to_string(),
                            message: e.to_string(),
                        })
                })
                .await?;

                tracing::debug!(key = %key, "cache invalidated (L1+L2+pub/sub)");
                Ok(())
            }
        }
    }

    /// Get cache statistics (L1 only).
    pub fn stats(&self) -> BackendStats {
        match self {
            CacheBackend::Local(map) => BackendStats {
                l1_entries: map.len(),
                mode: "local",
            },
            CacheBackend::Redis { local, .. } => BackendStats {
                l1_entries: local.len(),
                mode: "redis",
            },
        }
    }

    /// Get the local cache reference.
    pub fn local_cache(&self) -> &Arc<DashMap<String, CachedEntry>> {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }
}

/// Bounds one Redis round trip.
async fn with_deadline<T>(
    deadline: Duration,
    command: &'static str,
    key: &str,
    fut: impl std::future::Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| CacheError::Timeout {
            command,
            key: key.to_string(),
        })?
}

fn get_local(map: &DashMap<String, CachedEntry>, key: &str) -> Option<Arc<Vec<u8>>> {
    let entry = map.get(key)?;
    if entry.is_expired() {
        drop(entry);
        map.remove(key);
        return None;
    }
    Some(Arc::clone(&entry.data))
}

/// Cache backend statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendStats {
    pub l1_entries: usize,
    pub mode: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StalledRedis, unreachable_pool};

    #[tokio::test]
    async fn test_local_set_get_invalidate() {
        let backend = CacheBackend::new_local();
        backend
            .set("user-1", b"payload".to_vec(), Duration::from_secs(60))
            .await;

        let value = backend.get("user-1").await.unwrap().unwrap();
        assert_eq!(value.as_slice(), b"payload");

        backend.invalidate("user-1").await.unwrap();
        assert!(backend.get("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_entry_expires() {
        let backend = CacheBackend::new_local();
        backend.set("user-2", b"x".to_vec(), Duration::ZERO).await;

        assert!(backend.get("user-2").await.unwrap().is_none());
        assert_eq!(backend.stats().l1_entries, 0);
    }

    #[tokio::test]
    async fn test_unreachable_redis_reports_error() {
        let backend = CacheBackend::new_redis(
            unreachable_pool(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );

        let err = backend.get("user-3").await.unwrap_err();
        assert!(matches!(err, CacheError::Pool(_)));
        assert_eq!(backend.stats().mode, "redis");
    }

    #[tokio::test]
    async fn test_redis_mode_serves_l1_without_connection() {
        let backend = CacheBackend::new_redis(
            unreachable_pool(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        backend
            .set("user-4", b"cached".to_vec(), Duration::from_secs(60))
            .await;

        let value = backend.get("user-4").await.unwrap().unwrap();
        assert_eq!(value.as_slice(), b"cached");
    }

    #[tokio::test]
    async fn test_silent_redis_hits_command_timeout() {
        let redis = StalledRedis::start().await;
        let backend = CacheBackend::new_redis(
            redis.pool(),
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        let started = std::time::Instant::now();
        let err = backend.get("user-5").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { command: "GET", .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        let err = backend.invalidate("user-5").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { command: "DEL", .. }));
    }
}
