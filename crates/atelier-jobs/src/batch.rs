//! Bounded fan-out of an [`ItemHandler`] over a list of ids.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use atelier_core::defaults::{BATCH_PROGRESS_EVERY, FEATURE_WORKERS};

use crate::handler::{ItemHandler, ItemResult};

/// Configuration for the batch runner.
///
/// Both values are at least 1; set them through the `with_*` builders.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    workers: usize,
    progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: FEATURE_WORKERS,
            progress_every: BATCH_PROGRESS_EVERY,
        }
    }
}

impl BatchConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FEATURE_WORKERS` | `5` | Max concurrent items |
    pub fn from_env() -> Self {
        let workers = std::env::var("FEATURE_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(FEATURE_WORKERS);
        Self::default().with_workers(workers)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Maximum number of items processed concurrently.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Log progress after this many completions.
    pub fn progress_every(&self) -> usize {
        self.progress_every
    }
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    fn record(&mut self, result: &ItemResult) {
        match result {
            ItemResult::Success => self.succeeded += 1,
            ItemResult::Skipped(_) => self.skipped += 1,
            ItemResult::Failed(_) => self.failed += 1,
        }
    }
}

/// Runs a handler over many items with bounded concurrency.
///
/// Item failures and task panics are counted, never propagated.
pub struct BatchRunner {
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, handler: Arc<dyn ItemHandler>, ids: Vec<Uuid>) -> BatchReport {
        let start = Instant::now();
        let mut report = BatchReport {
            total: ids.len(),
            ..Default::default()
        };
        let name = handler.name();

        info!(
            subsystem = "jobs",
            component = "batch",
            job = name,
            total = report.total,
            workers = self.config.workers,
            "Batch started"
        );

        let permits = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = tokio::task::JoinSet::new();

        for id in ids {
            let handler = handler.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                (id, handler.process(id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    match &result {
                        ItemResult::Failed(reason) => {
                            warn!(job = name, item_id = %id, error = %reason, "Item failed")
                        }
                        ItemResult::Skipped(reason) => {
                            info!(job = name, item_id = %id, reason = %reason, "Item skipped")
                        }
                        ItemResult::Success => {}
                    }
                    report.record(&result);
                }
                Err(e) => {
                    error!(job = name, error = ?e, "Item task panicked");
                    report.failed += 1;
                }
            }

            let done = report.completed();
            if done < report.total && done.checked_rem(self.config.progress_every) == Some(0) {
                info!(job = name, done, total = report.total, "Batch progress");
            }
        }

        info!(
            subsystem = "jobs",
            component = "batch",
            job = name,
            total = report.total,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );
        report
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}
