//! PostgreSQL pool shared by the query store and the product catalog.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use atelier_core::{Error, Result};

/// Pool sizing for the search API and the feature jobs.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DB_MAX_CONNECTIONS` | `10` | Upper bound on open connections |
/// | `DB_MIN_CONNECTIONS` | `1` | Connections kept warm, never above the maximum |
/// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection before erroring |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let max = number("DB_MAX_CONNECTIONS")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.max_connections);
        let min = number("DB_MIN_CONNECTIONS")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.min_connections);
        let acquire = number("DB_ACQUIRE_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        defaults
            .with_max_connections(max)
            .with_min_connections(min)
            .with_acquire_timeout(acquire)
    }

    /// At least one connection; lowers the minimum if it would exceed the new maximum.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open a pool with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database pool ready"
    );
    Ok(pool)
}

/// Point-in-time connection counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Log pool counts under `label`, warning when the pool is saturated.
pub fn log_pool_metrics(pool: &PgPool, label: &str) -> PoolStats {
    let stats = PoolStats::of(pool);
    if stats.is_saturated() {
        warn!(
            subsystem = "db",
            component = "pool",
            label,
            pool_size = stats.size,
            "No idle database connections"
        );
    } else {
        debug!(
            subsystem = "db",
            component = "pool",
            label,
            pool_size = stats.size,
            pool_idle = stats.idle,
            "Database pool"
        );
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("DB_MAX_CONNECTIONS", "25"),
            ("DB_MIN_CONNECTIONS", "4"),
            ("DB_ACQUIRE_TIMEOUT_SECS", " 5 "),
        ]));
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("DB_MAX_CONNECTIONS", "many"),
            ("DB_MIN_CONNECTIONS", "-1"),
            ("DB_ACQUIRE_TIMEOUT_SECS", ""),
        ]));
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_min_never_exceeds_max() {
        let config = PoolConfig::from_lookup(lookup(&[
            ("DB_MAX_CONNECTIONS", "2"),
            ("DB_MIN_CONNECTIONS", "8"),
        ]));
        assert_eq!((config.max_connections, config.min_connections), (2, 2));

        let shrunk = PoolConfig::default()
            .with_min_connections(5)
            .with_max_connections(0);
        assert_eq!((shrunk.max_connections, shrunk.min_connections), (1, 1));
    }

    #[test]
    fn test_saturation() {
        assert!(PoolStats { size: 3, idle: 0 }.is_saturated());
        assert!(!PoolStats { size: 3, idle: 1 }.is_saturated());
        assert!(!PoolStats { size: 0, idle: 0 }.is_saturated());
    }
}
