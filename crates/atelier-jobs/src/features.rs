//! Offline product feature generation.
//!
//! For one product: resolve its category schema, pick representative images,
//! ask the vision model for a JSON feature map, lowercase its string values
//! and persist it. Products without a schema or without images are skipped.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use atelier_core::defaults::FEATURE_MAX_IMAGES;
use atelier_core::{
    CategorySchema, CategorySchemas, Error, GenerationBackend, ImagePart, Product, ProductImage,
    ProductFeatureStore, Result,
};
use atelier_inference::{decode_object, product_features_prompt};

use crate::handler::{ItemHandler, ItemResult};
use crate::images::{load_part, ImageLoader};

/// Generates and stores feature maps for products.
pub struct FeatureGenerator {
    store: Arc<dyn ProductFeatureStore>,
    backend: Arc<dyn GenerationBackend>,
    schemas: Arc<CategorySchemas>,
    images: Arc<dyn ImageLoader>,
    max_images: usize,
}

impl FeatureGenerator {
    pub fn new(
        store: Arc<dyn ProductFeatureStore>,
        backend: Arc<dyn GenerationBackend>,
        schemas: Arc<CategorySchemas>,
        images: Arc<dyn ImageLoader>,
    ) -> Self {
        Self {
            store,
            backend,
            schemas,
            images,
            max_images: FEATURE_MAX_IMAGES,
        }
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images.max(1);
        self
    }

    /// Generate and persist features for one product.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "features", product_id = %id))]
    pub async fn generate(&self, id: Uuid) -> Result<ItemResult> {
        let start = Instant::now();
        let product = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("product {}", id)))?;

        let Some((category_key, schema)) = schema_for(&self.schemas, &product) else {
            debug!(name = %product.name, "No schema for product categories");
            return Ok(ItemResult::Skipped("no schema".to_string()));
        };

        let selected = select_images(&product, self.max_images);
        if selected.is_empty() {
            debug!(name = %product.name, "Product has no images");
            return Ok(ItemResult::Skipped("no images".to_string()));
        }

        let mut parts: Vec<ImagePart> = Vec::with_capacity(selected.len());
        for image in selected {
            match load_part(self.images.as_ref(), image, image.mime_type()).await {
                Ok(part) => parts.push(part),
                Err(e) => warn!(path = %image.path, error = %e, "Skipping unreadable image"),
            }
        }
        if parts.is_empty() {
            return Ok(ItemResult::Skipped("no readable images".to_string()));
        }

        let prompt =
            product_features_prompt(&product.name, &product.description, category_key, schema);
        let raw = self
            .backend
            .generate_json_with_images(&prompt, &parts)
            .await?;
        let features = lowercase_strings(decode_object(&raw)?);

        self.store.set_features(id, &features).await?;
        info!(
            category = category_key,
            images = parts.len(),
            features = features.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Product features generated"
        );
        Ok(ItemResult::Success)
    }
}

#[async_trait]
impl ItemHandler for FeatureGenerator {
    fn name(&self) -> &'static str {
        "product_features"
    }

    async fn process(&self, id: Uuid) -> ItemResult {
        match self.generate(id).await {
            Ok(result) => result,
            Err(e) => ItemResult::Failed(e.to_string()),
        }
    }
}

/// First product category that resolves to a schema.
pub fn schema_for<'a>(
    schemas: &'a CategorySchemas,
    product: &Product,
) -> Option<(&'a str, &'a CategorySchema)> {
    product
        .categories
        .iter()
        .find_map(|category| schemas.lookup(category))
}

/// Up to `max` images across all variants, main images first.
pub fn select_images(product: &Product, max: usize) -> Vec<&ProductImage> {
    let all = product.variants.iter().flat_map(|v| v.images.iter());
    let main = all.clone().filter(|i| i.is_main);
    let rest = all.filter(|i| !i.is_main);
    main.chain(rest).take(max).collect()
}

/// Lowercase every string value, leaving other JSON types untouched.
pub fn lowercase_strings(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, Value::String(s.to_lowercase())),
            other => (k, other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{product, variant, write_image, MemoryFeatureStore};
    use atelier_inference::mock::MockGenerationBackend;
    use serde_json::json;

    const SCHEMAS: &str = r#"{
        "coat": {"attributes": [
            {"key": "has_belt", "type": "boolean", "question": "Has a belt?"},
            {"key": "material", "type": "select", "question": "Material?", "options": ["wool", "leather"]}
        ]}
    }"#;

    fn generator(
        store: Arc<MemoryFeatureStore>,
        backend: MockGenerationBackend,
        root: &std::path::Path,
    ) -> FeatureGenerator {
        FeatureGenerator::new(
            store,
            Arc::new(backend),
            Arc::new(CategorySchemas::from_json_str(SCHEMAS).unwrap()),
            Arc::new(crate::images::FsImageLoader::new(root)),
        )
    }

    #[test]
    fn test_select_images_prefers_main_and_caps() {
        let p = product(
            "Trench",
            &["Coats"],
            vec![
                variant("Black", &[("a.jpg", false), ("b.jpg", true)]),
                variant("Red", &[("c.jpg", false), ("d.png", true), ("e.jpg", false)]),
                variant("Blue", &[("f.jpg", false)]),
            ],
        );
        let paths: Vec<&str> = select_images(&p, 5).iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["b.jpg", "d.png", "a.jpg", "c.jpg", "e.jpg"]);
    }

    #[test]
    fn test_schema_for_uses_first_matching_category() {
        let schemas = CategorySchemas::from_json_str(SCHEMAS).unwrap();
        let p = product("Trench", &["Sale", "Winter Coats"], vec![]);
        assert_eq!(schema_for(&schemas, &p).map(|(k, _)| k), Some("coat"));
        let p = product("Jeans", &["Pants"], vec![]);
        assert!(schema_for(&schemas, &p).is_none());
    }

    #[test]
    fn test_lowercase_strings() {
        let map = json!({"material": "Wool", "has_belt": true, "count": 2})
            .as_object()
            .cloned()
            .unwrap();
        let out = lowercase_strings(map);
        assert_eq!(out["material"], json!("wool"));
        assert_eq!(out["has_belt"], json!(true));
        assert_eq!(out["count"], json!(2));
    }

    #[tokio::test]
    async fn test_generate_persists_lowercased_features() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "coat.jpg");
        let p = product("Trench", &["Coats"], vec![variant("Beige", &[("coat.jpg", true)])]);
        let id = p.id;
        let store = Arc::new(MemoryFeatureStore::with_products(vec![p]));
        let backend = MockGenerationBackend::new().with_response_mapping(
            "Analyze product: 'Trench'",
            r#"```json
{"has_belt": true, "material": "WOOL"}
```"#,
        );

        let gen = generator(store.clone(), backend.clone(), dir.path());
        assert_eq!(gen.process(id).await, ItemResult::Success);

        let features = store.features(id).unwrap();
        assert_eq!(features["material"], json!("wool"));
        assert_eq!(features["has_belt"], json!(true));
        assert_eq!(backend.vision_call_count(), 1);
        assert_eq!(backend.get_calls()[0].image_count, 1);
    }

    #[tokio::test]
    async fn test_skips_without_schema_or_images() {
        let dir = tempfile::tempdir().unwrap();
        let no_schema = product("Jeans", &["Pants"], vec![variant("Blue", &[("x.jpg", true)])]);
        let no_images = product("Trench", &["Coats"], vec![variant("Blue", &[])]);
        let (a, b) = (no_schema.id, no_images.id);
        let store = Arc::new(MemoryFeatureStore::with_products(vec![no_schema, no_images]));
        let backend = MockGenerationBackend::new();

        let gen = generator(store.clone(), backend.clone(), dir.path());
        assert!(matches!(gen.process(a).await, ItemResult::Skipped(_)));
        assert!(matches!(gen.process(b).await, ItemResult::Skipped(_)));
        assert_eq!(backend.generate_call_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_response_fails_item() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "coat.png");
        let p = product("Trench", &["Coats"], vec![variant("Beige", &[("coat.png", true)])]);
        let id = p.id;
        let store = Arc::new(MemoryFeatureStore::with_products(vec![p]));
        let backend = MockGenerationBackend::new().with_fixed_response("I cannot see the image");

        let gen = generator(store.clone(), backend, dir.path());
        assert!(matches!(gen.process(id).await, ItemResult::Failed(_)));
        assert!(store.features(id).is_none());
    }

    #[tokio::test]
    async fn test_unknown_product_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryFeatureStore::default());
        let gen = generator(store, MockGenerationBackend::new(), dir.path());
        assert!(matches!(
            gen.process(Uuid::new_v4()).await,
            ItemResult::Failed(msg) if msg.contains("Not found")
        ));
    }
}
