//! Search pipeline configuration.
//!
//! ## Environment
//!
//! - `QUERY_CACHE_TTL_SECS`: volatile cache expiry (default: 86400)
//! - `QUERY_CACHE_MEMORY_CAPACITY`: in-process cache size (default: 1000)
//! - `ATELIER_GEN_TIMEOUT_SECS`: bound on the generative tier (default: 20)
//! - `REDIS_ENABLED`: set to "false" or "0" to skip Redis (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::time::Duration;

use atelier_core::defaults;

/// Configuration for query resolution and its caches.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Expiry of volatile cache entries.
    pub cache_ttl: Duration,
    /// Capacity of the in-process cache used when Redis is unavailable.
    pub memory_capacity: usize,
    /// Upper bound on one generative resolution.
    pub gen_timeout: Duration,
    pub redis_enabled: bool,
    pub redis_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(defaults::QUERY_CACHE_TTL_SECS),
            memory_capacity: defaults::QUERY_CACHE_MEMORY_CAPACITY,
            gen_timeout: Duration::from_secs(defaults::QUERY_GEN_TIMEOUT_SECS),
            redis_enabled: true,
            redis_url: defaults::REDIS_URL.to_string(),
        }
    }
}

impl SearchConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let base = Self::default();

        let cache_ttl = env_parse::<u64>("QUERY_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(base.cache_ttl);
        let memory_capacity = env_parse::<usize>("QUERY_CACHE_MEMORY_CAPACITY")
            .filter(|n| *n > 0)
            .unwrap_or(base.memory_capacity);
        let gen_timeout = env_parse::<u64>("ATELIER_GEN_TIMEOUT_SECS")
            .filter(|n| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(base.gen_timeout);
        let redis_enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let redis_url = std::env::var("REDIS_URL").unwrap_or(base.redis_url);

        Self {
            cache_ttl,
            memory_capacity,
            gen_timeout,
            redis_enabled,
            redis_url,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    pub fn with_gen_timeout(mut self, timeout: Duration) -> Self {
        self.gen_timeout = timeout;
        self
    }

    /// Disable Redis; the in-process cache is used instead.
    pub fn without_redis(mut self) -> Self {
        self.redis_enabled = false;
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self.redis_enabled = true;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
