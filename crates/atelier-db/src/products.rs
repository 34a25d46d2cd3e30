//! Product catalog repository.
//!
//! Products are loaded with their categories, variants and images in four
//! batched queries regardless of result size.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use atelier_core::{
    Brightness, Error, Product, ProductCatalog, ProductFeatureStore, ProductImage, ProductVariant,
    Result,
};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.price, p.features";

/// Input for inserting a product with its variants.
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
    pub categories: Vec<String>,
    pub features: serde_json::Map<String, serde_json::Value>,
    pub variants: Vec<NewVariant>,
}

/// Input for one variant of a [`NewProduct`].
#[derive(Debug, Clone, Default)]
pub struct NewVariant {
    pub color: String,
    pub size: String,
    pub brightness: Option<String>,
    pub stock_quantity: i32,
    /// (storage path, is_main)
    pub images: Vec<(String, bool)>,
}

/// PostgreSQL implementation of the catalog traits.
pub struct PgProductRepository {
    pool: Pool<Postgres>,
}

impl PgProductRepository {
    /// Create a new PgProductRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a product, creating missing categories. Returns the product id.
    pub async fn create(&self, product: &NewProduct) -> Result<Uuid> {
        let now = Utc::now();
        let product_id = Uuid::now_v7();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO product (id, name, slug, description, price, features, created_at_utc, updated_at_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(product_id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(product.price)
        .bind(serde_json::Value::Object(product.features.clone()))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for name in &product.categories {
            let category_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO category (id, name, created_at_utc) VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(name)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            sqlx::query(
                "INSERT INTO product_category (product_id, category_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(product_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        for variant in &product.variants {
            let variant_id = Uuid::now_v7();
            sqlx::query(
                r#"
                INSERT INTO product_variant (id, product_id, color, size, brightness, stock_quantity, created_at_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(variant_id)
            .bind(product_id)
            .bind(&variant.color)
            .bind(&variant.size)
            .bind(variant.brightness.as_deref())
            .bind(variant.stock_quantity)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            for (path, is_main) in &variant.images {
                sqlx::query(
                    "INSERT INTO product_image (id, variant_id, path, is_main, created_at_utc) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::now_v7())
                .bind(variant_id)
                .bind(path)
                .bind(is_main)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(product_id)
    }

    /// Attach categories, variants and images to product rows.
    async fn assemble(&self, rows: Vec<PgRow>) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = rows
            .into_iter()
            .map(|row| {
                let features: serde_json::Value = row.get("features");
                Product {
                    id: row.get("id"),
                    name: row.get("name"),
                    slug: row.get("slug"),
                    description: row.get("description"),
                    price: row.get("price"),
                    categories: Vec::new(),
                    features: match features {
                        serde_json::Value::Object(map) => map,
                        _ => serde_json::Map::new(),
                    },
                    variants: Vec::new(),
                }
            })
            .collect();

        if products.is_empty() {
            return Ok(products);
        }
        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();

        let category_rows = sqlx::query(
            r#"
            SELECT pc.product_id, c.name
            FROM product_category pc
            JOIN category c ON c.id = pc.category_id
            WHERE pc.product_id = ANY($1)
            ORDER BY c.name
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut categories: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in category_rows {
            categories
                .entry(row.get("product_id"))
                .or_default()
                .push(row.get("name"));
        }

        let variant_rows = sqlx::query(
            r#"
            SELECT id, product_id, color, size, brightness, stock_quantity
            FROM product_variant
            WHERE product_id = ANY($1)
            ORDER BY created_at_utc, id
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let variant_ids: Vec<Uuid> = variant_rows.iter().map(|r| r.get("id")).collect();
        let mut images = self.images_for(&variant_ids).await?;

        let mut variants: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
        for row in variant_rows {
            let id: Uuid = row.get("id");
            variants
                .entry(row.get("product_id"))
                .or_default()
                .push(row_to_variant(&row, images.remove(&id).unwrap_or_default()));
        }

        for product in &mut products {
            product.categories = categories.remove(&product.id).unwrap_or_default();
            product.variants = variants.remove(&product.id).unwrap_or_default();
        }
        Ok(products)
    }

    async fn images_for(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ProductImage>>> {
        let mut images: HashMap<Uuid, Vec<ProductImage>> = HashMap::new();
        if variant_ids.is_empty() {
            return Ok(images);
        }
        let rows = sqlx::query(
            r#"
            SELECT id, variant_id, path, is_main
            FROM product_image
            WHERE variant_id = ANY($1)
            ORDER BY created_at_utc, id
            "#,
        )
        .bind(variant_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for row in rows {
            images
                .entry(row.get("variant_id"))
                .or_default()
                .push(ProductImage {
                    id: row.get("id"),
                    path: row.get("path"),
                    is_main: row.get("is_main"),
                });
        }
        Ok(images)
    }
}

fn row_to_variant(row: &PgRow, images: Vec<ProductImage>) -> ProductVariant {
    ProductVariant {
        id: row.get("id"),
        color: row.get("color"),
        size: row.get("size"),
        brightness: row.get("brightness"),
        stock_quantity: row.get("stock_quantity"),
        images,
    }
}

#[async_trait]
impl ProductCatalog for PgProductRepository {
    async fn category_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM category ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn distinct_colors(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT color FROM product_variant WHERE color <> '' ORDER BY color",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM product p
            WHERE $1::text IS NULL OR EXISTS (
                SELECT 1 FROM product_category pc
                JOIN category c ON c.id = pc.category_id
                WHERE pc.product_id = p.id AND LOWER(c.name) = LOWER($1)
            )
            ORDER BY p.name, p.id
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let products = self.assemble(rows).await?;
        debug!(
            subsystem = "db",
            component = "products",
            category = ?category,
            result_count = products.len(),
            "Listed products"
        );
        Ok(products)
    }
}

#[async_trait]
impl ProductFeatureStore for PgProductRepository {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM product p WHERE p.id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(self.assemble(rows).await?.into_iter().next())
    }

    async fn list_product_ids(&self) -> Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT id FROM product ORDER BY created_at_utc, id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn set_features(
        &self,
        id: Uuid,
        features: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE product SET features = $2, updated_at_utc = $3 WHERE id = $1")
                .bind(id)
                .bind(serde_json::Value::Object(features.clone()))
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("product {}", id)));
        }
        Ok(())
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<ProductVariant>> {
        let row = sqlx::query(
            "SELECT id, product_id, color, size, brightness, stock_quantity FROM product_variant WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut images = self.images_for(&[id]).await?;
        Ok(Some(row_to_variant(
            &row,
            images.remove(&id).unwrap_or_default(),
        )))
    }

    async fn list_variant_ids(&self) -> Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT id FROM product_variant ORDER BY created_at_utc, id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn set_variant_brightness(&self, id: Uuid, brightness: &str) -> Result<()> {
        let value = Brightness::parse(brightness)
            .ok_or_else(|| Error::InvalidInput(format!("invalid brightness '{}'", brightness)))?;

        let result = sqlx::query("UPDATE product_variant SET brightness = $2 WHERE id = $1")
            .bind(id)
            .bind(value.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("variant {}", id)));
        }
        Ok(())
    }
}
