//! In-memory fixtures shared by the job tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use atelier_core::{Product, ProductFeatureStore, ProductImage, ProductVariant, Result};

pub fn variant(color: &str, images: &[(&str, bool)]) -> ProductVariant {
    ProductVariant {
        id: Uuid::new_v4(),
        color: color.to_string(),
        size: "M".to_string(),
        brightness: None,
        stock_quantity: 1,
        images: images
            .iter()
            .map(|(path, is_main)| ProductImage {
                id: Uuid::new_v4(),
                path: path.to_string(),
                is_main: *is_main,
            })
            .collect(),
    }
}

pub fn product(name: &str, categories: &[&str], variants: Vec<ProductVariant>) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: name.to_lowercase(),
        description: String::new(),
        price: 100.0,
        categories: categories.iter().map(|c| c.to_string()).collect(),
        features: Map::new(),
        variants,
    }
}

pub fn write_image(root: &Path, name: &str) {
    std::fs::write(root.join(name), [0xFFu8, 0xD8, 0xFF]).unwrap();
}

#[derive(Default)]
pub struct MemoryFeatureStore {
    products: Mutex<Vec<Product>>,
    features: Mutex<HashMap<Uuid, Map<String, Value>>>,
    brightness: Mutex<HashMap<Uuid, String>>,
}

impl MemoryFeatureStore {
    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
            ..Default::default()
        }
    }

    pub fn features(&self, id: Uuid) -> Option<Map<String, Value>> {
        self.features.lock().unwrap().get(&id).cloned()
    }

    pub fn brightness(&self, id: Uuid) -> Option<String> {
        self.brightness.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ProductFeatureStore for MemoryFeatureStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_product_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.products.lock().unwrap().iter().map(|p| p.id).collect())
    }

    async fn set_features(&self, id: Uuid, features: &Map<String, Value>) -> Result<()> {
        self.features.lock().unwrap().insert(id, features.clone());
        Ok(())
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.variants.iter())
            .find(|v| v.id == id)
            .cloned())
    }

    async fn list_variant_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.variants.iter().map(|v| v.id))
            .collect())
    }

    async fn set_variant_brightness(&self, id: Uuid, brightness: &str) -> Result<()> {
        self.brightness
            .lock()
            .unwrap()
            .insert(id, brightness.to_string());
        Ok(())
    }
}
