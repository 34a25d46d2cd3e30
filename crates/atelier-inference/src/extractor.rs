//! Generative search extraction.
//!
//! Turns one free-text query into a [`ResolvedQuery`] with two sequential
//! generation calls: category classification, then feature/color extraction
//! against the resolved category's attribute schema.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use atelier_core::{
    Brightness, CategorySchema, CategorySchemas, FilterMap, FilterValue, GenerationBackend,
    ProductCatalog, ResolvedQuery, Result, Suggestion,
};

use crate::json::{clean_text_answer, decode_object};
use crate::prompts::{classification_prompt, extraction_prompt};

/// Bare category synonyms. A query equal to one of these never narrows on
/// the attribute value `"other"`.
pub const GENERIC_TERMS: &[&str] = &[
    "pants", "trousers", "slacks", "bottoms", "coat", "coats", "jacket", "jackets", "outerwear",
    "shirt", "shirts", "tshirt", "t-shirt", "tops", "wear", "clothes", "clothing",
];

/// Outcome of a generative extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// No category could be determined; nothing should be persisted.
    Unresolved,
    /// A category resolved and features were extracted for it.
    Resolved(ResolvedQuery),
}

impl Extraction {
    /// The resolved query, or an empty one when unresolved.
    pub fn into_query(self) -> ResolvedQuery {
        match self {
            Extraction::Unresolved => ResolvedQuery::empty(),
            Extraction::Resolved(q) => q,
        }
    }
}

/// Generative search extractor.
pub struct SearchExtractor {
    backend: Arc<dyn GenerationBackend>,
    schemas: Arc<CategorySchemas>,
    catalog: Option<Arc<dyn ProductCatalog>>,
}

impl SearchExtractor {
    pub fn new(backend: Arc<dyn GenerationBackend>, schemas: Arc<CategorySchemas>) -> Self {
        Self {
            backend,
            schemas,
            catalog: None,
        }
    }

    /// Use the catalog's color vocabulary to guide extraction.
    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn schemas(&self) -> &CategorySchemas {
        &self.schemas
    }

    /// Classify a query into a known category key.
    ///
    /// `Ok(None)` means the model answered with nothing recognisable.
    #[instrument(skip(self), fields(subsystem = "inference", component = "extractor", op = "classify"))]
    pub async fn classify(&self, query: &str, context: Option<&str>) -> Result<Option<String>> {
        let names = self.schemas.category_names();
        let prompt = classification_prompt(query, &names, context);
        let answer = self.backend.generate(&prompt).await?;
        let predicted = clean_text_answer(&answer);
        let matched = match_category(&self.schemas, &predicted).map(str::to_string);
        debug!(predicted = %predicted, matched = ?matched, "Category prediction");
        Ok(matched)
    }

    /// Resolve a query end to end.
    ///
    /// Errors mean the backend failed or returned undecodable output; the
    /// caller decides how to degrade.
    #[instrument(skip(self), fields(subsystem = "inference", component = "extractor", op = "extract", model = %self.backend.model_name()))]
    pub async fn extract(&self, query: &str, context: Option<&str>) -> Result<Extraction> {
        let start = Instant::now();

        let (category, schema) = match self.classify(query, context).await? {
            Some(key) => match self.schemas.get(&key) {
                Some((_, schema)) => (key, schema),
                None => return Ok(Extraction::Unresolved),
            },
            None => match context.and_then(|ctx| self.context_schema(ctx)) {
                Some((ctx, schema)) => {
                    debug!(category = %ctx, "Falling back to context category");
                    (ctx.to_string(), schema)
                }
                None => return Ok(Extraction::Unresolved),
            },
        };

        let colors = self.available_colors().await;
        let prompt = extraction_prompt(query, &category, schema, &colors);
        let raw = self.backend.generate_json(&prompt).await?;
        let data = decode_object(&raw)?;
        let resolved = post_process(&data, query, &category);

        info!(
            category = %category,
            filters = resolved.filters.len(),
            colors = resolved.colors.len(),
            negative_filters = resolved.negative_filters.len(),
            negative_colors = resolved.negative_colors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Query extracted"
        );
        Ok(Extraction::Resolved(resolved))
    }

    /// Schema for a context category: exact key first, then containment.
    fn context_schema<'a>(&'a self, context: &'a str) -> Option<(&'a str, &'a CategorySchema)> {
        self.schemas
            .get(context)
            .or_else(|| self.schemas.lookup(context))
            .map(|(_, schema)| (context, schema))
    }

    async fn available_colors(&self) -> Vec<String> {
        let Some(catalog) = &self.catalog else {
            return Vec::new();
        };
        match catalog.distinct_colors().await {
            Ok(colors) => colors,
            Err(e) => {
                warn!(error = %e, "Color vocabulary unavailable, extracting without it");
                Vec::new()
            }
        }
    }
}

/// Match a model's category answer against the known schema keys.
///
/// Case-insensitive; a trailing plural "s" on the answer is ignored.
pub fn match_category<'a>(schemas: &'a CategorySchemas, predicted: &str) -> Option<&'a str> {
    let predicted = predicted.trim().to_lowercase();
    if predicted.is_empty() {
        return None;
    }
    let singular = predicted.trim_end_matches('s');
    schemas
        .category_names()
        .into_iter()
        .find(|cat| {
            let cat = cat.to_lowercase();
            cat == predicted || cat == singular
        })
}

/// Whether a raw query is a bare generic category synonym.
pub fn is_generic_query(query: &str) -> bool {
    GENERIC_TERMS.contains(&query.trim().to_lowercase().as_str())
}

/// Normalize a decoded extraction response into a [`ResolvedQuery`].
///
/// Order matters: a brightness term clears colors, colors are lowercased,
/// then both filter maps are flattened.
pub fn post_process(data: &Map<String, Value>, query: &str, category: &str) -> ResolvedQuery {
    let raw_filters = unwrap_category(data.get("filters"), category);

    let colors = if mentions_brightness(raw_filters) {
        Vec::new()
    } else {
        lowercase_list(data.get("colors"))
    };
    let negative_colors = lowercase_list(data.get("negative_colors"));

    let generic = is_generic_query(query);
    let filters = flatten_filters(raw_filters, generic);
    let negative_filters = flatten_filters(
        unwrap_category(data.get("negative_filters"), category),
        generic,
    );

    ResolvedQuery {
        category: Some(category.to_string()),
        filters,
        colors,
        negative_filters,
        negative_colors,
        suggestion: parse_suggestion(data.get("suggestion")),
    }
}

/// Filters nested under the category name are unwrapped.
fn unwrap_category<'a>(value: Option<&'a Value>, category: &str) -> Option<&'a Map<String, Value>> {
    let map = value?.as_object()?;
    let nested = map
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(category))
        .and_then(|(_, v)| v.as_object());
    Some(nested.unwrap_or(map))
}

fn last_segment(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn mentions_brightness(filters: Option<&Map<String, Value>>) -> bool {
    let Some(filters) = filters else {
        return false;
    };
    filters
        .iter()
        .filter(|(k, _)| last_segment(k) == "brightness")
        .flat_map(|(_, v)| as_list(v))
        .filter_map(Value::as_str)
        .any(|b| Brightness::parse(b).is_some())
}

fn lowercase_list(value: Option<&Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(value) = value else {
        return out;
    };
    for item in as_list(value) {
        let text = match item {
            Value::String(s) => s.trim().to_lowercase(),
            Value::Null => continue,
            other => other.to_string().to_lowercase(),
        };
        if !text.is_empty() && !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

fn flatten_filters(raw: Option<&Map<String, Value>>, generic_query: bool) -> FilterMap {
    let mut out = FilterMap::new();
    let Some(raw) = raw else {
        return out;
    };

    for (key, value) in raw {
        let clean_key = last_segment(key).trim();
        if clean_key.is_empty() {
            continue;
        }
        let mut kept: Vec<FilterValue> = Vec::new();
        for item in as_list(value) {
            let Some(fv) = FilterValue::from_json(item) else {
                continue;
            };
            let skip = match &fv {
                FilterValue::Text(s) => s == "unknown" || (generic_query && s == "other"),
                FilterValue::Bool(_) => false,
            };
            if !skip && !kept.contains(&fv) {
                kept.push(fv);
            }
        }
        if kept.is_empty() {
            continue;
        }
        let entry = out.entry(clean_key.to_string()).or_default();
        for fv in kept {
            if !entry.contains(&fv) {
                entry.push(fv);
            }
        }
    }
    out
}

fn parse_suggestion(value: Option<&Value>) -> Option<Suggestion> {
    let suggestion: Suggestion = serde_json::from_value(value?.clone()).ok()?;
    if suggestion.text.trim().is_empty() && suggestion.suggested_query.trim().is_empty() {
        None
    } else {
        Some(suggestion)
    }
}
