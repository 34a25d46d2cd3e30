//! Three-tier query resolution.
//!
//! Tiers are tried strictly in order, each only on a miss of the previous:
//!
//! 1. volatile cache, keyed by normalized query + context category
//! 2. durable store, keyed by normalized query alone (hit count incremented)
//! 3. generative extraction, bounded by a timeout
//!
//! A tier-2 hit is copied into tier 1. A successful tier-3 result is
//! written to tier 2 and then tier 1 from the same value. Every failure
//! degrades to an empty [`ResolvedQuery`]; resolution never returns an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use atelier_core::defaults;
use atelier_core::{normalize_query, QueryStore, ResolvedQuery};
use atelier_inference::{Extraction, SearchExtractor};

use crate::cache::QueryCache;
use crate::config::SearchConfig;
use crate::keys::{cache_key, durable_key};

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Cache,
    Store,
    Generative,
    /// No category could be determined (or the query was blank); nothing
    /// was persisted.
    Unresolved,
    /// The generative tier failed or timed out.
    Failed,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Cache => "cache",
            ResolutionTier::Store => "store",
            ResolutionTier::Generative => "generative",
            ResolutionTier::Unresolved => "unresolved",
            ResolutionTier::Failed => "failed",
        }
    }
}

/// Resolve one raw query in a browsing context.
#[async_trait]
pub trait QueryResolution: Send + Sync {
    async fn resolve(&self, raw_query: &str, context: Option<&str>) -> ResolvedQuery;
}

/// The cache chain.
pub struct QueryResolver {
    cache: Arc<dyn QueryCache>,
    store: Option<Arc<dyn QueryStore>>,
    extractor: Arc<SearchExtractor>,
    cache_ttl: Duration,
    gen_timeout: Duration,
}

impl QueryResolver {
    pub fn new(cache: Arc<dyn QueryCache>, extractor: Arc<SearchExtractor>) -> Self {
        Self {
            cache,
            store: None,
            extractor,
            cache_ttl: Duration::from_secs(defaults::QUERY_CACHE_TTL_SECS),
            gen_timeout: Duration::from_secs(defaults::QUERY_GEN_TIMEOUT_SECS),
        }
    }

    /// Enable the durable tier.
    pub fn with_store(mut self, store: Arc<dyn QueryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.cache_ttl = config.cache_ttl;
        self.gen_timeout = config.gen_timeout;
        self
    }

    pub fn with_gen_timeout(mut self, timeout: Duration) -> Self {
        self.gen_timeout = timeout;
        self
    }

    /// Resolve and report which tier answered.
    #[instrument(skip(self), fields(subsystem = "search", component = "resolver", op = "resolve"))]
    pub async fn resolve_with_tier(
        &self,
        raw_query: &str,
        context: Option<&str>,
    ) -> (ResolvedQuery, ResolutionTier) {
        let start = Instant::now();
        let query = normalize_query(raw_query);
        if query.is_empty() {
            return (ResolvedQuery::empty(), ResolutionTier::Unresolved);
        }
        let key = cache_key(&query, context);

        if let Some(hit) = self.cache.get(&key).await {
            debug!(
                tier = "cache",
                cache_key = %key,
                duration_ms = start.elapsed().as_millis() as u64,
                "Query resolved"
            );
            return (hit, ResolutionTier::Cache);
        }

        if let Some(hit) = self.from_store(&query).await {
            self.cache.set_with_ttl(&key, &hit, self.cache_ttl).await;
            debug!(
                tier = "store",
                duration_ms = start.elapsed().as_millis() as u64,
                "Query resolved"
            );
            return (hit, ResolutionTier::Store);
        }

        let outcome =
            tokio::time::timeout(self.gen_timeout, self.extractor.extract(&query, context)).await;

        match outcome {
            Ok(Ok(Extraction::Resolved(result))) => {
                self.persist(&query, &result).await;
                self.cache.set_with_ttl(&key, &result, self.cache_ttl).await;
                info!(
                    tier = "generative",
                    category = ?result.category,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Query resolved"
                );
                (result, ResolutionTier::Generative)
            }
            Ok(Ok(Extraction::Unresolved)) => {
                debug!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "No category for query"
                );
                (ResolvedQuery::empty(), ResolutionTier::Unresolved)
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Generative resolution failed, continuing without AI filters"
                );
                (ResolvedQuery::empty(), ResolutionTier::Failed)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.gen_timeout.as_secs(),
                    "Generative resolution timed out, continuing without AI filters"
                );
                (ResolvedQuery::empty(), ResolutionTier::Failed)
            }
        }
    }

    async fn from_store(&self, query: &str) -> Option<ResolvedQuery> {
        let store = self.store.as_ref()?;
        let durable = durable_key(query);
        match store.find(&durable).await {
            Ok(Some(stored)) => {
                if let Err(e) = store.record_hit(&durable).await {
                    warn!(error = %e, "Failed to record durable hit");
                }
                Some(stored.result_data)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Durable store lookup failed, skipping tier");
                None
            }
        }
    }

    async fn persist(&self, query: &str, result: &ResolvedQuery) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.upsert(&durable_key(query), result).await {
            warn!(error = %e, "Failed to persist resolved query");
        }
    }
}

#[async_trait]
impl QueryResolution for QueryResolver {
    async fn resolve(&self, raw_query: &str, context: Option<&str>) -> ResolvedQuery {
        self.resolve_with_tier(raw_query, context).await.0
    }
}
