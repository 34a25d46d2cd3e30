//! In-memory product catalog.
//!
//! Serves fixed product lists (demos, fixtures, small deployments) through
//! the same [`ProductCatalog`] interface as the database repository.

use std::collections::BTreeSet;

use async_trait::async_trait;

use atelier_core::{Product, ProductCatalog, Result};

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: Vec<Product>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Load products from a JSON array.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        Ok(Self::new(products))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn category_names(&self) -> Result<Vec<String>> {
        let mut seen: Vec<String> = Vec::new();
        for name in self.products.iter().flat_map(|p| p.categories.iter()) {
            if !seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                seen.push(name.clone());
            }
        }
        seen.sort();
        Ok(seen)
    }

    async fn distinct_colors(&self) -> Result<Vec<String>> {
        let colors: BTreeSet<String> = self
            .products
            .iter()
            .flat_map(|p| p.variants.iter())
            .map(|v| v.color.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Ok(colors.into_iter().collect())
    }

    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        Ok(self
            .products
            .iter()
            .filter(|p| category.map_or(true, |c| p.in_category(c)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: &str = r#"[
        {"id": "00000000-0000-0000-0000-000000000001", "name": "Wool Coat", "slug": "wool-coat",
         "description": "", "price": 150.0, "categories": ["Coats"],
         "variants": [{"id": "00000000-0000-0000-0000-0000000000a1", "color": "Black", "size": "M",
                       "brightness": "dark", "stock_quantity": 3}]},
        {"id": "00000000-0000-0000-0000-000000000002", "name": "Wrap Dress", "slug": "wrap-dress",
         "description": "", "price": 90.0, "categories": ["Dress", "coats"],
         "variants": [{"id": "00000000-0000-0000-0000-0000000000b1", "color": "Red", "size": "S",
                       "brightness": null, "stock_quantity": 0}]}
    ]"#;

    #[tokio::test]
    async fn test_static_catalog() {
        let catalog = StaticCatalog::from_json_str(PRODUCTS).unwrap();

        assert_eq!(catalog.category_names().await.unwrap(), vec!["Coats", "Dress"]);
        assert_eq!(catalog.distinct_colors().await.unwrap(), vec!["Black", "Red"]);
        assert_eq!(catalog.list_products(Some("COATS")).await.unwrap().len(), 2);
        assert_eq!(catalog.list_products(Some("Dress")).await.unwrap().len(), 1);
        assert_eq!(catalog.list_products(None).await.unwrap().len(), 2);
        assert!(catalog.list_products(Some("Pants")).await.unwrap().is_empty());
    }
}
