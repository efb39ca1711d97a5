//! Read-through cache of user snapshots.
//!
//! Identity resolution goes through [`UserCache::resolve`]: a hit returns the
//! cached snapshot, a miss reads the store and populates the cache. Cache
//! failures never fail a request; they are logged and the store is read
//! directly. Redis calls carry their own deadline (see [`CacheBackend`]), so
//! only the store read counts against the store timeout.
//!
//! ## Cache Key
//!
//! `user-{id}`, holding the JSON-encoded [`User`].
//!
//! Missing users are not cached, and concurrent misses for the same id may
//! each reach the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use social_storage::{StorageError, StorageResult, User, UserId, UserStorage};

use super::backend::{BackendStats, CacheBackend};
use crate::config::CacheConfig;
use crate::gatekeeper::DEFAULT_STORE_TIMEOUT;

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UserCacheStats {
    /// Resolutions answered from the cache.
    pub hits: u64,
    /// Resolutions that missed and read the store.
    pub misses: u64,
    /// Resolutions that bypassed a failing cache.
    pub fallbacks: u64,
    /// Total store reads.
    pub store_fetches: u64,
    /// Backend mode and size, absent when caching is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendStats>,
}

impl UserCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Read-through cache mapping user id to [`User`].
pub struct UserCache {
    store: Arc<dyn UserStorage>,
    backend: Option<CacheBackend>,
    ttl: Duration,
    store_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
    store_fetches: AtomicU64,
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("backend", &self.backend)
            .field("ttl", &self.ttl)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl UserCache {
    /// Create a cache in front of `store`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use std::time::Duration;
    /// use social_auth::cache::{CacheBackend, UserCache};
    ///
    /// let cache = UserCache::new(store, CacheBackend::new_local(), Duration::from_secs(300));
    /// ```
    pub fn new(store: Arc<dyn UserStorage>, backend: CacheBackend, ttl: Duration) -> Self {
        Self::with_backend(store, Some(backend), ttl)
    }

    /// Create a pass-through cache; every resolution reads the store.
    pub fn disabled(store: Arc<dyn UserStorage>) -> Self {
        Self::with_backend(store, None, Duration::ZERO)
    }

    /// Create a cache honouring `config.enabled`.
    pub fn from_config(
        store: Arc<dyn UserStorage>,
        backend: CacheBackend,
        config: &CacheConfig,
    ) -> Self {
        if config.enabled {
            Self::new(store, backend, config.user_ttl)
        } else {
            tracing::info!("User cache disabled, identities resolve against the store");
            Self::disabled(store)
        }
    }

    fn with_backend(
        store: Arc<dyn UserStorage>,
        backend: Option<CacheBackend>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            ttl,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            store_fetches: AtomicU64::new(0),
        }
    }

    /// Sets the deadline for a store read.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Whether a cache backend is in use.
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Resolves a user, cache first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the store has no such user,
    /// `StorageError::Timeout` if the store read exceeds the store timeout, and
    /// propagates other store failures unchanged.
    pub async fn resolve(&self, id: UserId) -> StorageResult<User> {
        let Some(backend) = &self.backend else {
            return self.fetch(id).await;
        };

        let key = cache_key(id);
        match backend.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<User>(&bytes) {
                Ok(user) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(user_id = id, "user cache hit");
                    return Ok(user);
                }
                Err(e) => {
                    // Overwritten by the repopulation below.
                    self.fallbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        user_id = id,
                        error = %e,
                        "corrupt user cache entry, reading store"
                    );
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(user_id = id, "user cache miss");
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(user_id = id, error = %e, "user cache unavailable, reading store");
                return self.fetch(id).await;
            }
        }

        let user = self.fetch(id).await?;
        match serde_json::to_vec(&user) {
            Ok(bytes) => backend.set(&key, bytes, self.ttl).await,
            Err(e) => tracing::warn!(user_id = id, error = %e, "failed to encode user for cache"),
        }
        Ok(user)
    }

    /// Drops the cached snapshot of a user.
    ///
    /// Failures are logged; the entry then ages out with its TTL.
    pub async fn invalidate(&self, id: UserId) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.invalidate(&cache_key(id)).await {
            tracing::warn!(user_id = id, error = %e, "failed to invalidate cached user");
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> UserCacheStats {
        UserCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
            backend: self.backend.as_ref().map(CacheBackend::stats),
        }
    }

    async fn fetch(&self, id: UserId) -> StorageResult<User> {
        self.store_fetches.fetch_add(1, Ordering::Relaxed);
        tokio::time::timeout(self.store_timeout, self.store.find_by_id(id))
            .await
            .map_err(|_| StorageError::timeout("user_lookup"))??
            .ok_or_else(|| StorageError::not_found("user", id))
    }
}

fn cache_key(id: UserId) -> String {
    format!("user-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CountingUserStore, StalledRedis, unreachable_pool};

    fn cache_with(store: &Arc<CountingUserStore>) -> UserCache {
        UserCache::new(
            store.clone(),
            CacheBackend::new_local(),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn test_cold_then_warm_resolve() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let cache = cache_with(&store);

        let user = cache.resolve(1).await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(store.fetches(), 1);

        let again = cache.resolve(1).await.unwrap();
        assert_eq!(again, user);
        assert_eq!(store.fetches(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.backend.unwrap().l1_entries, 1);
    }

    #[tokio::test]
    async fn test_missing_user_not_cached() {
        let store = Arc::new(CountingUserStore::default());
        let cache = cache_with(&store);

        let err = cache.resolve(9).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.resolve(9).await.unwrap_err().is_not_found());
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        store.fail_with_connection_error();
        let cache = cache_with(&store);

        let err = cache.resolve(1).await.unwrap_err();
        assert!(matches!(err, StorageError::ConnectionError { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let cache = cache_with(&store);

        cache.resolve(1).await.unwrap();
        cache.invalidate(1).await;
        cache.resolve(1).await.unwrap();
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_falls_back_and_repairs() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let backend = CacheBackend::new_local();
        backend
            .set("user-1", b"{not json".to_vec(), Duration::from_secs(60))
            .await;
        let cache = UserCache::new(store.clone(), backend, Duration::from_secs(60));

        assert_eq!(cache.resolve(1).await.unwrap().id, 1);
        assert_eq!(cache.stats().fallbacks, 1);

        cache.resolve(1).await.unwrap();
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back_to_store() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let cache = UserCache::new(
            store.clone(),
            CacheBackend::new_redis(
                unreachable_pool(),
                Duration::from_secs(60),
                Duration::from_secs(5),
            ),
            Duration::from_secs(60),
        );

        assert_eq!(cache.resolve(1).await.unwrap().id, 1);
        assert_eq!(cache.stats().fallbacks, 1);
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_silent_backend_falls_back_to_store() {
        let redis = StalledRedis::start().await;
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let cache = UserCache::new(
            store.clone(),
            CacheBackend::new_redis(
                redis.pool(),
                Duration::from_secs(60),
                Duration::from_millis(100),
            ),
            Duration::from_secs(60),
        )
        .with_store_timeout(Duration::from_millis(500));

        assert_eq!(cache.resolve(1).await.unwrap().id, 1);
        assert_eq!(cache.stats().fallbacks, 1);
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn test_slow_store_read_times_out() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        store.delay(Duration::from_secs(2));
        let cache = cache_with(&store).with_store_timeout(Duration::from_millis(50));

        let err = cache.resolve(1).await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout { operation: "user_lookup" }));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_reads_store() {
        let store = Arc::new(CountingUserStore::with_user(1, "user", 1));
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let cache = UserCache::from_config(store.clone(), CacheBackend::new_local(), &config);

        cache.resolve(1).await.unwrap();
        cache.resolve(1).await.unwrap();
        assert!(!cache.is_enabled());
        assert_eq!(store.fetches(), 2);
        assert!(cache.stats().backend.is_none());
    }

    #[test]
    fn test_hit_rate() {
        let stats = UserCacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
    }
}
