//! Volatile cache for resolved queries (resolution tier 1).
//!
//! Redis is the primary backend. When Redis is disabled or unreachable an
//! in-process LRU cache takes its place, so repeated queries still skip the
//! durable store and the generative backend.
//!
//! Cache failures are never errors for the caller: a failed read is a miss
//! and a failed write is reported as `false`.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use atelier_core::defaults;
use atelier_core::ResolvedQuery;

use crate::config::SearchConfig;

/// Point lookup and set-with-expiry over resolved queries.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Cached result for a key; absence and failures are both `None`.
    async fn get(&self, key: &str) -> Option<ResolvedQuery>;

    /// Store a result with an expiry. Returns whether it was written.
    async fn set_with_ttl(&self, key: &str, value: &ResolvedQuery, ttl: Duration) -> bool;

    /// Remove a key. Returns whether the backend accepted the request.
    async fn invalidate(&self, key: &str) -> bool;
}

// =============================================================================
// REDIS
// =============================================================================

/// Query cache backed by Redis.
#[derive(Clone)]
pub struct RedisQueryCache {
    inner: Arc<RedisQueryCacheInner>,
}

struct RedisQueryCacheInner {
    /// Redis connection manager (None if disabled or unreachable).
    connection: RwLock<Option<ConnectionManager>>,
    enabled: bool,
}

impl RedisQueryCache {
    /// Connect to the given URL. Connection failures yield a cache that
    /// reports every lookup as a miss.
    pub async fn connect(redis_url: &str) -> Self {
        let connection = match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    info!(
                        subsystem = "search",
                        component = "query_cache",
                        url = %redis_url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
                        "Redis query cache enabled"
                    );
                    Some(conn)
                }
                Err(e) => {
                    warn!(
                        subsystem = "search",
                        component = "query_cache",
                        error = %e,
                        "Failed to connect to Redis, query cache disabled"
                    );
                    None
                }
            },
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "query_cache",
                    error = %e,
                    "Invalid Redis URL, query cache disabled"
                );
                None
            }
        };

        Self {
            inner: Arc::new(RedisQueryCacheInner {
                connection: RwLock::new(connection),
                enabled: true,
            }),
        }
    }

    /// Create a disabled cache (for testing or when Redis is unavailable).
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(RedisQueryCacheInner {
                connection: RwLock::new(None),
                enabled: false,
            }),
        }
    }

    /// Check if caching is enabled and connected.
    pub async fn is_connected(&self) -> bool {
        self.inner.enabled && self.inner.connection.read().await.is_some()
    }
}

#[async_trait]
impl QueryCache for RedisQueryCache {
    async fn get(&self, key: &str) -> Option<ResolvedQuery> {
        let mut conn_guard = self.inner.connection.write().await;
        let conn = conn_guard.as_mut()?;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(result) => {
                    debug!(cache_key = %key, "Cache HIT");
                    Some(result)
                }
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "Cache deserialization error");
                    None
                }
            },
            Ok(None) => {
                debug!(cache_key = %key, "Cache MISS");
                None
            }
            Err(e) => {
                error!(error = %e, "Redis GET error");
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &ResolvedQuery, ttl: Duration) -> bool {
        let mut conn_guard = self.inner.connection.write().await;
        let conn = match conn_guard.as_mut() {
            Some(c) => c,
            None => return false,
        };

        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Cache serialization error");
                return false;
            }
        };

        let ttl_secs = ttl.as_secs().max(1);
        match conn.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
            Ok(_) => {
                debug!(cache_key = %key, ttl_secs, "Cache SET");
                true
            }
            Err(e) => {
                error!(error = %e, "Redis SET error");
                false
            }
        }
    }

    async fn invalidate(&self, key: &str) -> bool {
        let mut conn_guard = self.inner.connection.write().await;
        let conn = match conn_guard.as_mut() {
            Some(c) => c,
            None => return false,
        };

        match conn.del::<_, ()>(key).await {
            Ok(_) => {
                debug!(cache_key = %key, "Cache INVALIDATE");
                true
            }
            Err(e) => {
                error!(error = %e, "Redis DEL error");
                false
            }
        }
    }
}

// =============================================================================
// IN-PROCESS
// =============================================================================

/// Longest expiry honoured by the in-process cache.
pub const MAX_MEMORY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Bounded in-process cache with per-entry expiry.
#[derive(Clone)]
pub struct MemoryQueryCache {
    entries: Arc<Mutex<LruCache<String, (ResolvedQuery, Instant)>>>,
}

impl MemoryQueryCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new(defaults::QUERY_CACHE_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn get(&self, key: &str) -> Option<ResolvedQuery> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                debug!(cache_key = %key, "Memory cache HIT");
                Some(value.clone())
            }
            Some(_) => {
                entries.pop(key);
                debug!(cache_key = %key, "Memory cache entry expired");
                None
            }
            None => {
                debug!(cache_key = %key, "Memory cache MISS");
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &ResolvedQuery, ttl: Duration) -> bool {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_MEMORY_TTL))
            .unwrap_or(now);
        self.entries
            .lock()
            .await
            .put(key.to_string(), (value.clone(), expires_at));
        true
    }

    async fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key);
        true
    }
}

/// Build the volatile cache for a configuration: Redis when enabled and
/// reachable, otherwise the in-process cache.
pub async fn query_cache_from_config(config: &SearchConfig) -> Arc<dyn QueryCache> {
    if config.redis_enabled {
        let redis = RedisQueryCache::connect(&config.redis_url).await;
        if redis.is_connected().await {
            return Arc::new(redis);
        }
    }
    info!(
        subsystem = "search",
        component = "query_cache",
        capacity = config.memory_capacity,
        "Using in-process query cache"
    );
    Arc::new(MemoryQueryCache::new(config.memory_capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResolvedQuery {
        let mut rq = ResolvedQuery::with_category("Coats");
        rq.colors.push("black".to_string());
        rq
    }

    #[tokio::test]
    async fn test_disabled_redis_cache_misses() {
        let cache = RedisQueryCache::disabled();
        assert!(!cache.is_connected().await);
        assert!(cache.get("k").await.is_none());
        assert!(!cache.set_with_ttl("k", &sample(), Duration::from_secs(60)).await);
        assert!(!cache.invalidate("k").await);
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_invalidate() {
        let cache = MemoryQueryCache::new(4);
        assert!(cache.get("k").await.is_none());

        assert!(cache.set_with_ttl("k", &sample(), Duration::from_secs(60)).await);
        assert_eq!(cache.get("k").await, Some(sample()));

        assert!(cache.invalidate("k").await);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_entries_expire() {
        let cache = MemoryQueryCache::new(4);
        cache
            .set_with_ttl("k", &sample(), Duration::from_secs(10))
            .await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_caps_oversized_ttl() {
        let cache = MemoryQueryCache::new(4);
        assert!(
            cache
                .set_with_ttl("k", &sample(), Duration::from_secs(u64::MAX))
                .await
        );
        assert_eq!(cache.get("k").await, Some(sample()));

        tokio::time::advance(MAX_MEMORY_TTL + Duration::from_secs(1)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_evicts_least_recent() {
        let cache = MemoryQueryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set_with_ttl("a", &sample(), ttl).await;
        cache.set_with_ttl("b", &sample(), ttl).await;
        cache.get("a").await;
        cache.set_with_ttl("c", &sample(), ttl).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let cache = MemoryQueryCache::new(0);
        cache
            .set_with_ttl("k", &sample(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_selector_falls_back_to_memory() {
        let config = SearchConfig::default().without_redis().with_memory_capacity(8);
        let cache = query_cache_from_config(&config).await;
        assert!(cache.set_with_ttl("k", &sample(), Duration::from_secs(60)).await);
        assert!(cache.get("k").await.is_some());
    }
}
