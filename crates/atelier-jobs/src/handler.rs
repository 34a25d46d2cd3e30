//! Per-item handlers for batch jobs.

use async_trait::async_trait;
use uuid::Uuid;

/// Result of processing one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    /// The item was updated.
    Success,
    /// Nothing to do for this item (no schema, no images, ...).
    Skipped(String),
    /// Processing failed; sibling items are unaffected.
    Failed(String),
}

/// Processes one catalog item by id.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn process(&self, id: Uuid) -> ItemResult;
}
