//! Structured logging field names for atelier.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, tier-3 resolutions, batch completion |
//! | DEBUG | Tier hits/misses, decision points, config choices |
//! | TRACE | Per-product filtering, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "resolver", "merge", "catalog_filter", "ollama", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Normalized search query text.
pub const QUERY: &str = "query";

/// Category name (detected or context).
pub const CATEGORY: &str = "category";

/// Product identifier.
pub const PRODUCT_ID: &str = "product_id";

/// Variant identifier.
pub const VARIANT_ID: &str = "variant_id";

// ─── Resolution fields ─────────────────────────────────────────────────────

/// Cache chain tier that answered: "cache", "store", "generative".
pub const TIER: &str = "tier";

/// Volatile cache key.
pub const CACHE_KEY: &str = "cache_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned.
pub const RESULT_COUNT: &str = "result_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
