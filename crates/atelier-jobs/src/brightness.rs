//! Per-variant brightness detection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use atelier_core::{Brightness, Error, GenerationBackend, ProductFeatureStore, Result};
use atelier_inference::{decode_object, BRIGHTNESS_PROMPT};

use crate::handler::{ItemHandler, ItemResult};
use crate::images::{load_part, ImageLoader};

/// Classifies a variant's representative image as light, medium or dark.
pub struct BrightnessDetector {
    store: Arc<dyn ProductFeatureStore>,
    backend: Arc<dyn GenerationBackend>,
    images: Arc<dyn ImageLoader>,
}

impl BrightnessDetector {
    pub fn new(
        store: Arc<dyn ProductFeatureStore>,
        backend: Arc<dyn GenerationBackend>,
        images: Arc<dyn ImageLoader>,
    ) -> Self {
        Self {
            store,
            backend,
            images,
        }
    }

    /// Detect and persist the brightness of one variant.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "brightness", variant_id = %id))]
    pub async fn detect(&self, id: Uuid) -> Result<ItemResult> {
        let variant = self
            .store
            .get_variant(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("variant {}", id)))?;

        let Some(image) = variant.main_image() else {
            debug!("Variant has no images");
            return Ok(ItemResult::Skipped("no images".to_string()));
        };

        let part = load_part(self.images.as_ref(), image, image_mime_type(&image.path)).await?;
        let raw = self
            .backend
            .generate_json_with_images(BRIGHTNESS_PROMPT, std::slice::from_ref(&part))
            .await?;
        let brightness = parse_brightness(&raw)?;

        self.store
            .set_variant_brightness(id, brightness.as_str())
            .await?;
        info!(color = %variant.color, brightness = %brightness, "Variant brightness detected");
        Ok(ItemResult::Success)
    }
}

#[async_trait]
impl ItemHandler for BrightnessDetector {
    fn name(&self) -> &'static str {
        "variant_brightness"
    }

    async fn process(&self, id: Uuid) -> ItemResult {
        match self.detect(id).await {
            Ok(result) => result,
            Err(e) => ItemResult::Failed(e.to_string()),
        }
    }
}

/// JPEG for `.jpg`/`.jpeg`, PNG otherwise.
pub fn image_mime_type(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "image/png"
    }
}

/// Read the `brightness` key of a model response.
pub fn parse_brightness(raw: &str) -> Result<Brightness> {
    let data = decode_object(raw)?;
    let value = data
        .get("brightness")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Inference("response has no 'brightness' value".to_string()))?;
    Brightness::parse(value)
        .ok_or_else(|| Error::Inference(format!("invalid brightness value '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::FsImageLoader;
    use crate::test_support::{product, variant, write_image, MemoryFeatureStore};
    use atelier_inference::mock::MockGenerationBackend;

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type("a/b.JPG"), "image/jpeg");
        assert_eq!(image_mime_type("a/b.jpeg"), "image/jpeg");
        assert_eq!(image_mime_type("a/b.png"), "image/png");
        assert_eq!(image_mime_type("a/b.webp"), "image/png");
    }

    #[test]
    fn test_parse_brightness() {
        assert_eq!(
            parse_brightness(r#"{"brightness": "Dark"}"#).unwrap(),
            Brightness::Dark
        );
        assert!(parse_brightness(r#"{"brightness": "greyish"}"#).is_err());
        assert!(parse_brightness(r#"{"tone": "light"}"#).is_err());
        assert!(parse_brightness("dark").is_err());
    }

    #[tokio::test]
    async fn test_detect_uses_main_image_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "side.jpg");
        write_image(dir.path(), "front.jpeg");
        let p = product(
            "Trench",
            &["Coats"],
            vec![variant("Navy", &[("side.jpg", false), ("front.jpeg", true)])],
        );
        let variant_id = p.variants[0].id;
        let store = Arc::new(MemoryFeatureStore::with_products(vec![p]));
        let backend = MockGenerationBackend::new().with_fixed_response(r#"{"brightness": "dark"}"#);

        let detector = BrightnessDetector::new(
            store.clone(),
            Arc::new(backend.clone()),
            Arc::new(FsImageLoader::new(dir.path())),
        );
        assert_eq!(detector.process(variant_id).await, ItemResult::Success);
        assert_eq!(store.brightness(variant_id).as_deref(), Some("dark"));
        assert_eq!(backend.vision_call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_value_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png");
        let p = product("Tee", &["Shirts"], vec![variant("White", &[("a.png", false)])]);
        let variant_id = p.variants[0].id;
        let store = Arc::new(MemoryFeatureStore::with_products(vec![p]));
        let backend =
            MockGenerationBackend::new().with_fixed_response(r#"{"brightness": "bright"}"#);

        let detector = BrightnessDetector::new(
            store.clone(),
            Arc::new(backend),
            Arc::new(FsImageLoader::new(dir.path())),
        );
        assert!(matches!(detector.process(variant_id).await, ItemResult::Failed(_)));
        assert!(store.brightness(variant_id).is_none());
    }

    #[tokio::test]
    async fn test_variant_without_images_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let p = product("Tee", &["Shirts"], vec![variant("White", &[])]);
        let variant_id = p.variants[0].id;
        let store = Arc::new(MemoryFeatureStore::with_products(vec![p]));
        let backend = MockGenerationBackend::new();

        let detector = BrightnessDetector::new(
            store,
            Arc::new(backend.clone()),
            Arc::new(FsImageLoader::new(dir.path())),
        );
        assert!(matches!(detector.process(variant_id).await, ItemResult::Skipped(_)));
        assert_eq!(backend.generate_call_count(), 0);
    }
}
