//! Centralized default constants for atelier.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.

// =============================================================================
// QUERY RESOLUTION
// =============================================================================

/// Expiry for resolved queries in the volatile cache (24 hours).
pub const QUERY_CACHE_TTL_SECS: u64 = 86_400;

/// Capacity of the in-process fallback cache used when Redis is unavailable.
pub const QUERY_CACHE_MEMORY_CAPACITY: usize = 1000;

/// Prefix for volatile cache keys.
pub const QUERY_CACHE_PREFIX: &str = "atelier:query:";

/// Bounded timeout around the generative tier of one query resolution.
pub const QUERY_GEN_TIMEOUT_SECS: u64 = 20;

/// Default Redis URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "qwen2.5:7b";

/// Timeout for generation HTTP requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 60;

/// Generation calls slower than this are logged as slow.
pub const SLOW_GENERATION_MS: u64 = 30_000;

/// Environment variable selecting the vision-capable model.
pub const ENV_OLLAMA_VISION_MODEL: &str = "OLLAMA_VISION_MODEL";

// =============================================================================
// CATALOG
// =============================================================================

/// Default location of the declarative category schema file.
pub const CATEGORY_SCHEMAS_PATH: &str = "schemas.json";

/// Maximum number of product images sent for feature generation.
pub const FEATURE_MAX_IMAGES: usize = 5;

// =============================================================================
// BATCH JOBS
// =============================================================================

/// Default number of parallel feature-generation workers.
pub const FEATURE_WORKERS: usize = 5;

/// Log batch progress every N completed items.
pub const BATCH_PROGRESS_EVERY: usize = 5;

// =============================================================================
// DATABASE
// =============================================================================

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/atelier";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;
