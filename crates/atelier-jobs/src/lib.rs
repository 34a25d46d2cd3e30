//! # atelier-jobs
//!
//! Offline catalog enrichment for atelier.
//!
//! This crate provides:
//! - Product feature generation from images and category schemas
//! - Per-variant brightness detection
//! - A bounded batch runner with per-item failure isolation
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use atelier_jobs::{BatchConfig, BatchRunner, FeatureGenerator, FsImageLoader};
//!
//! let db = atelier_db::Database::connect("postgres://...").await?;
//! let store = Arc::new(atelier_db::PgProductRepository::new(db.pool.clone()));
//! let images = Arc::new(FsImageLoader::from_env());
//! let generator = FeatureGenerator::new(store.clone(), backend, schemas, images);
//!
//! let ids = store.list_product_ids().await?;
//! let report = BatchRunner::new(BatchConfig::from_env()).run(Arc::new(generator), ids).await;
//! println!("{} updated, {} failed", report.succeeded, report.failed);
//! ```

pub mod batch;
pub mod brightness;
pub mod features;
pub mod handler;
pub mod images;

#[cfg(test)]
mod test_support;

// Re-export core types
pub use atelier_core::*;

pub use batch::{BatchConfig, BatchReport, BatchRunner};
pub use brightness::{image_mime_type, parse_brightness, BrightnessDetector};
pub use features::{lowercase_strings, schema_for, select_images, FeatureGenerator};
pub use handler::{ItemHandler, ItemResult};
pub use images::{FsImageLoader, ImageLoader};
