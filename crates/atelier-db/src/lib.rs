//! # atelier-db
//!
//! PostgreSQL database layer for atelier.
//!
//! This crate provides:
//! - Connection pool management
//! - The durable tier of query resolution (normalized query -> result, with hit counting)
//! - The product catalog store (products, variants, images, feature maps)
//!
//! ## Example
//!
//! ```rust,ignore
//! use atelier_db::{Database, QueryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/atelier").await?;
//!     if let Some(stored) = db.search_queries.find("black coat").await? {
//!         println!("{} hits", stored.hit_count);
//!     }
//!     Ok(())
//! }
//! ```
pub mod pool;
pub mod products;
pub mod search_queries;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use atelier_core::*;

pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig, PoolStats};
pub use products::{NewProduct, NewVariant, PgProductRepository};
pub use search_queries::PgSearchQueryRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Durable resolved-query store.
    pub search_queries: PgSearchQueryRepository,
    /// Product catalog.
    pub products: PgProductRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            search_queries: PgSearchQueryRepository::new(pool.clone()),
            products: PgProductRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
