//! atelier-api: HTTP JSON surface for natural-language product search.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_core::defaults::{CATEGORY_SCHEMAS_PATH, DATABASE_URL, SERVER_PORT};
use atelier_core::{CategorySchemas, GenerationBackend, ProductCatalog, QueryStore};
use atelier_db::{log_pool_metrics, Database, PoolConfig};
use atelier_inference::{OllamaBackend, SearchExtractor};
use atelier_search::{
    query_cache_from_config, QueryResolver, SearchConfig, SearchOutcome, SearchPipeline,
    SearchRequest,
};

/// Maximum number of phrases accepted in one search request.
const MAX_QUERIES: usize = 20;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<SearchPipeline>,
}

fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str =
        std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/search", post(search))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parse_allowed_origins()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "atelier_api=debug,atelier_search=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_api=debug,atelier_search=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("atelier-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(SERVER_PORT);
    let schemas_path = std::env::var("CATEGORY_SCHEMAS_PATH")
        .unwrap_or_else(|_| CATEGORY_SCHEMAS_PATH.to_string());

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!("Database migrations applied");
    log_pool_metrics(&db.pool, "startup");

    let schemas = Arc::new(CategorySchemas::from_path(&schemas_path)?);
    let catalog: Arc<dyn ProductCatalog> = Arc::new(db.products);
    let store: Arc<dyn QueryStore> = Arc::new(db.search_queries);

    let backend = OllamaBackend::from_env();
    match backend.health_check().await {
        Ok(true) => info!(model = backend.model_name(), "Generation backend reachable"),
        _ => warn!("Generation backend unreachable; new queries will resolve to empty results"),
    }

    let search_config = SearchConfig::from_env();
    let cache = query_cache_from_config(&search_config).await;
    let extractor = Arc::new(
        SearchExtractor::new(Arc::new(backend), schemas.clone()).with_catalog(catalog.clone()),
    );
    let resolver = QueryResolver::new(cache, extractor)
        .with_store(store)
        .with_config(&search_config);
    let pipeline = SearchPipeline::new(Arc::new(resolver), catalog, schemas);

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// SEARCH
// =============================================================================

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    if request.queries.len() > MAX_QUERIES {
        return Err(ApiError::BadRequest(format!(
            "At most {} queries per request",
            MAX_QUERIES
        )));
    }
    let outcome = state.pipeline.search(request).await?;
    Ok(Json(outcome))
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(atelier_core::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<atelier_core::Error> for ApiError {
    fn from(err: atelier_core::Error) -> Self {
        match err {
            atelier_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            atelier_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Search request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
