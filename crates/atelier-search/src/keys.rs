//! Key functions for the resolution tiers.
//!
//! The volatile cache is keyed by query text *and* context category, the
//! durable store by query text alone, so a durable hit is shared across
//! browsing contexts.

use sha2::{Digest, Sha256};

use atelier_core::defaults::QUERY_CACHE_PREFIX;
use atelier_core::normalize_query;

/// Separates the hashed fields so `("ab", "c")` and `("a", "bc")` differ.
const FIELD_SEPARATOR: &[u8] = &[0x1f];

/// Volatile cache key for a query in a browsing context.
///
/// Both inputs are normalized, so keys are insensitive to case and
/// surrounding whitespace. A blank context is the same as no context.
pub fn cache_key(query: &str, context: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());

    if let Some(ctx) = context.map(normalize_query).filter(|c| !c.is_empty()) {
        hasher.update(FIELD_SEPARATOR);
        hasher.update(ctx.as_bytes());
    }

    let hash = hex::encode(hasher.finalize());
    format!("{}{}", QUERY_CACHE_PREFIX, &hash[..16])
}

/// Durable store key: the normalized query text.
pub fn durable_key(raw: &str) -> String {
    normalize_query(raw)
}
