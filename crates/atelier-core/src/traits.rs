//! Core traits for atelier abstractions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Product, ProductVariant, ResolvedQuery, StoredSearchQuery};

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// An image payload attached to a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImagePart {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// Backend for text generation.
///
/// Responses are raw model text; JSON variants ask the backend to constrain
/// output to a JSON object, but callers must still decode leniently.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate a JSON-constrained response.
    async fn generate_json(&self, prompt: &str) -> Result<String>;

    /// Generate a JSON-constrained response grounded on one or more images.
    async fn generate_json_with_images(&self, prompt: &str, images: &[ImagePart])
        -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// STORAGE TRAITS
// =============================================================================

/// Durable store of resolved queries keyed by normalized query text.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Point lookup by normalized query text.
    async fn find(&self, query_text: &str) -> Result<Option<StoredSearchQuery>>;

    /// Atomically increment the hit counter, returning the new count.
    async fn record_hit(&self, query_text: &str) -> Result<Option<i64>>;

    /// Insert or replace the result for a normalized query (last write wins).
    async fn upsert(&self, query_text: &str, result: &ResolvedQuery) -> Result<StoredSearchQuery>;
}

/// Read-side access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// All category names.
    async fn category_names(&self) -> Result<Vec<String>>;

    /// Distinct variant colors across the catalog, sorted.
    async fn distinct_colors(&self) -> Result<Vec<String>>;

    /// Products (with variants and images) in a category, or all products.
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>>;
}

/// Write-side access used by offline feature generation.
#[async_trait]
pub trait ProductFeatureStore: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;

    async fn list_product_ids(&self) -> Result<Vec<Uuid>>;

    /// Replace a product's feature map.
    async fn set_features(
        &self,
        id: Uuid,
        features: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>>;

    async fn list_variant_ids(&self) -> Result<Vec<Uuid>>;

    async fn set_variant_brightness(&self, id: Uuid, brightness: &str) -> Result<()>;
}
