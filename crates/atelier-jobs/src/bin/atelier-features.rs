//! atelier-features: offline catalog enrichment.
//!
//! Generates product feature maps (default) or per-variant brightness
//! (`--brightness`) for the whole catalog or a single item.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use atelier_core::defaults::{CATEGORY_SCHEMAS_PATH, DATABASE_URL};
use atelier_core::{CategorySchemas, ProductFeatureStore};
use atelier_db::{log_pool_metrics, Database, PgProductRepository};
use atelier_inference::OllamaBackend;
use atelier_jobs::{
    BatchConfig, BatchReport, BatchRunner, BrightnessDetector, FeatureGenerator, FsImageLoader,
    ItemHandler,
};

#[derive(Parser)]
#[command(name = "atelier-features")]
#[command(author, version, about = "Generate product features and variant brightness")]
struct Cli {
    /// Number of items processed concurrently (default: FEATURE_WORKERS or 5)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Detect variant brightness instead of product features
    #[arg(short, long)]
    brightness: bool,

    /// Process a single product (or, with --brightness, its variants)
    #[arg(short, long)]
    product: Option<Uuid>,
}

fn init_logging() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_jobs=info,atelier_inference=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = Path::new(&path);
            let dir = path.parent().unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("atelier-features.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(log_ansi.unwrap_or(false)),
                    )
                    .init();
            }
            Some(guard)
        }
        None => {
            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            } else {
                let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
                if let Some(ansi) = log_ansi {
                    layer = layer.with_ansi(ansi);
                }
                registry.with(layer).init();
            }
            None
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<BatchReport> {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
    let db = Database::connect(&database_url).await?;
    let store = Arc::new(PgProductRepository::new(db.pool.clone()));
    let backend = Arc::new(OllamaBackend::from_env());
    let images = Arc::new(FsImageLoader::from_env());

    let mut config = BatchConfig::from_env();
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }

    let (handler, ids): (Arc<dyn ItemHandler>, Vec<Uuid>) = if cli.brightness {
        let ids = match cli.product {
            Some(product_id) => store
                .get_product(product_id)
                .await?
                .map(|p| p.variants.iter().map(|v| v.id).collect::<Vec<_>>())
                .ok_or_else(|| anyhow::anyhow!("product {} not found", product_id))?,
            None => store.list_variant_ids().await?,
        };
        let handler: Arc<dyn ItemHandler> =
            Arc::new(BrightnessDetector::new(store.clone(), backend, images));
        (handler, ids)
    } else {
        let schemas_path = std::env::var("CATEGORY_SCHEMAS_PATH")
            .unwrap_or_else(|_| CATEGORY_SCHEMAS_PATH.to_string());
        let schemas = Arc::new(CategorySchemas::from_path(&schemas_path)?);
        let ids = match cli.product {
            Some(product_id) => vec![product_id],
            None => store.list_product_ids().await?,
        };
        let handler: Arc<dyn ItemHandler> =
            Arc::new(FeatureGenerator::new(store.clone(), backend, schemas, images));
        (handler, ids)
    };

    let job = handler.name();
    info!(job, items = ids.len(), "Starting enrichment");
    let report = BatchRunner::new(config).run(handler, ids).await;
    log_pool_metrics(&db.pool, job);
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!(
                "total={} succeeded={} skipped={} failed={}",
                report.total, report.succeeded, report.skipped, report.failed
            );
            if report.failed > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "Enrichment aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
