//! # atelier-search
//!
//! Natural-language product search for atelier.
//!
//! This crate provides:
//! - Cache keys and the volatile query cache (Redis, or in-process LRU)
//! - Three-tier query resolution: cache, durable store, generative extraction
//! - Multi-query merge with contradiction and category-conflict detection
//! - Catalog filtering and display variant selection
//! - [`SearchPipeline`], tying the above together for one request
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use atelier_search::{
//!     query_cache_from_config, QueryResolver, SearchConfig, SearchPipeline, SearchRequest,
//! };
//!
//! let config = SearchConfig::from_env();
//! let cache = query_cache_from_config(&config).await;
//! let resolver = QueryResolver::new(cache, extractor)
//!     .with_store(store)
//!     .with_config(&config);
//! let pipeline = SearchPipeline::new(Arc::new(resolver), catalog, schemas);
//!
//! let outcome = pipeline
//!     .search(SearchRequest::new(["black coat", "without belt"]))
//!     .await?;
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod display;
pub mod filter;
pub mod keys;
pub mod merge;
pub mod pipeline;
pub mod resolver;

// Re-export core types
pub use atelier_core::*;

pub use cache::{
    query_cache_from_config, MemoryQueryCache, QueryCache, RedisQueryCache, MAX_MEMORY_TTL,
};
pub use catalog::StaticCatalog;
pub use config::SearchConfig;
pub use display::{select_display_variant, DisplayChoice};
pub use filter::{FilterSelection, ManualFilters, BRIGHTNESS_KEY};
pub use keys::{cache_key, durable_key};
pub use merge::{
    merge, AccumulatedFilterState, ConflictSignal, MergeFold, MergeOutcome, QueryContribution,
};
pub use pipeline::{ProductHit, SearchOutcome, SearchPipeline, SearchRequest, SearchSummary};
pub use resolver::{QueryResolution, QueryResolver, ResolutionTier};
