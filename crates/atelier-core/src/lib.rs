//! # atelier-core
//!
//! Core types, traits, and abstractions for atelier product search.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other atelier crates depend on: resolved queries, filter values, the
//! category schema store and the color family tables.

pub mod color;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod schema;
pub mod traits;

// Re-export commonly used types at crate root
pub use color::{family_display_value, group_by_family, resolve_family, ColorFacet};
pub use error::{Error, Result};
pub use models::*;
pub use schema::{AttributeDef, AttributeType, CategorySchema, CategorySchemas};
pub use traits::*;
