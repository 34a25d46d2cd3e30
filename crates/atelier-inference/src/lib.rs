//! # atelier-inference
//!
//! Generative backend abstraction and search extraction for atelier.
//!
//! This crate provides:
//! - Ollama implementation of [`GenerationBackend`] (default), with image
//!   payloads for vision models
//! - Lenient decoding of model JSON output
//! - Prompt builders for classification, extraction and catalog enrichment
//! - The generative search extractor used as the last resolution tier
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Expose [`mock::MockGenerationBackend`] to other crates' tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atelier_inference::{CategorySchemas, OllamaBackend, SearchExtractor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let schemas = Arc::new(CategorySchemas::from_path("schemas.json").unwrap());
//!     let extractor = SearchExtractor::new(Arc::new(OllamaBackend::from_env()), schemas);
//!     let outcome = extractor.extract("black coat without belt", None).await.unwrap();
//!     println!("{:?}", outcome.into_query());
//! }
//! ```

pub mod extractor;
pub mod json;
pub mod prompts;

#[cfg(feature = "ollama")]
pub mod ollama;

// Mock generation backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use atelier_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

pub use extractor::{
    is_generic_query, match_category, post_process, Extraction, SearchExtractor, GENERIC_TERMS,
};
pub use json::{clean_text_answer, decode_object, strip_code_fence, DecodeError};
pub use prompts::{
    classification_prompt, extraction_prompt, product_features_prompt, BRIGHTNESS_PROMPT,
};
