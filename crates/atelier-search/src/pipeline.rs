//! End-to-end product search.
//!
//! Phrases are merged, the effective category is chosen, products of that
//! category are filtered and each result gets a display variant. A
//! final-phrase category conflict returns before the catalog is touched.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use atelier_core::{
    group_by_family, AttributeDef, CategorySchemas, ColorFacet, FilterMap, Product,
    ProductCatalog, Result, Suggestion,
};

use crate::display::{select_display_variant, DisplayChoice};
use crate::filter::{FilterSelection, ManualFilters};
use crate::merge::{merge, AccumulatedFilterState, ConflictSignal, MergeOutcome, QueryContribution};
use crate::resolver::QueryResolution;

/// One search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Ordered search phrases; blank ones are ignored.
    pub queries: Vec<String>,
    /// Category currently being browsed.
    pub category: Option<String>,
    pub manual: ManualFilters,
    /// The previous response's suggestion was accepted.
    pub accepted_suggestion: bool,
}

impl SearchRequest {
    pub fn new<S: Into<String>>(queries: impl IntoIterator<Item = S>) -> Self {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_manual(mut self, manual: ManualFilters) -> Self {
        self.manual = manual;
        self
    }

    pub fn with_accepted_suggestion(mut self, accepted: bool) -> Self {
        self.accepted_suggestion = accepted;
        self
    }
}

/// A product in the result set with its display variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHit {
    pub product: Product,
    pub display: Option<DisplayChoice>,
}

/// UI-facing state of a completed search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    /// Category the products were filtered by.
    pub category: Option<String>,
    /// The phrases moved the search to a different category.
    pub category_switched: bool,
    pub suggestion: Option<Suggestion>,
    pub selected_colors: Vec<String>,
    pub selected_brightness: Vec<String>,
    pub selected_sizes: Vec<String>,
    /// Active attribute values, with boolean negatives shown inverted.
    pub selected_features: FilterMap,
    pub negative_colors: Vec<String>,
    /// Attributes of the category's schema.
    pub available_features: Vec<AttributeDef>,
    pub available_brightness: Vec<String>,
    pub available_sizes: Vec<String>,
    pub color_facets: Vec<ColorFacet>,
    pub trace: Vec<QueryContribution>,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Results {
        products: Vec<ProductHit>,
        summary: SearchSummary,
    },
    /// The final phrase names another category; ask before switching.
    Conflict {
        conflict: ConflictSignal,
        trace: Vec<QueryContribution>,
    },
}

/// Search over a catalog with generative query resolution.
#[derive(Clone)]
pub struct SearchPipeline {
    resolver: Arc<dyn QueryResolution>,
    catalog: Arc<dyn ProductCatalog>,
    schemas: Arc<CategorySchemas>,
}

impl SearchPipeline {
    pub fn new(
        resolver: Arc<dyn QueryResolution>,
        catalog: Arc<dyn ProductCatalog>,
        schemas: Arc<CategorySchemas>,
    ) -> Self {
        Self {
            resolver,
            catalog,
            schemas,
        }
    }

    #[instrument(skip(self, request), fields(subsystem = "search", component = "pipeline", op = "search"))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome> {
        let start = Instant::now();
        let queries: Vec<String> = request
            .queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        let requested = request
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let state = if queries.is_empty() {
            AccumulatedFilterState::default()
        } else {
            match merge(self.resolver.as_ref(), &queries, requested).await {
                MergeOutcome::Merged(state) => state,
                MergeOutcome::Conflict { conflict, trace } => {
                    return Ok(SearchOutcome::Conflict { conflict, trace });
                }
            }
        };

        let (category, category_switched) = self
            .effective_category(state.last_detected_category.as_deref(), requested)
            .await?;

        let products = self.catalog.list_products(category.as_deref()).await?;
        let schema = category
            .as_deref()
            .and_then(|c| self.schemas.lookup(c))
            .map(|(_, schema)| schema);

        let available_brightness = distinct_lower(
            products
                .iter()
                .flat_map(|p| p.variants.iter())
                .filter_map(|v| v.brightness.as_deref()),
        );
        let available_sizes = distinct_sorted(
            products
                .iter()
                .flat_map(|p| p.variants.iter())
                .map(|v| v.size.as_str()),
        );
        let all_colors = self.catalog.distinct_colors().await?;
        let color_facets = group_by_family(all_colors.iter().map(String::as_str));

        let selection = FilterSelection::build(&state, &request.manual, schema);
        let hits: Vec<ProductHit> = selection
            .apply(products)
            .into_iter()
            .map(|product| ProductHit {
                display: select_display_variant(
                    &product,
                    &selection.colors,
                    &selection.brightness,
                ),
                product,
            })
            .collect();

        let suggestion = if request.accepted_suggestion {
            None
        } else {
            state.last_suggestion.clone()
        };

        info!(
            category = ?category,
            category_switched,
            query_count = queries.len(),
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );

        let summary = SearchSummary {
            category,
            category_switched,
            suggestion,
            selected_features: selection.display_features(),
            selected_colors: selection.colors,
            selected_brightness: selection.brightness,
            selected_sizes: selection.sizes,
            negative_colors: selection.negative_colors,
            available_features: schema.map(|s| s.attributes.clone()).unwrap_or_default(),
            available_brightness,
            available_sizes,
            color_facets,
            trace: state.trace,
        };

        Ok(SearchOutcome::Results {
            products: hits,
            summary,
        })
    }

    /// The detected category wins when the catalog knows it; otherwise the
    /// requested one stays.
    async fn effective_category(
        &self,
        detected: Option<&str>,
        requested: Option<&str>,
    ) -> Result<(Option<String>, bool)> {
        let requested_owned = requested.map(str::to_string);
        let Some(detected) = detected else {
            return Ok((requested_owned, false));
        };

        let known = self.catalog.category_names().await?;
        let Some(name) = known.into_iter().find(|n| n.eq_ignore_ascii_case(detected)) else {
            debug!(category = %detected, "Detected category not in catalog");
            return Ok((requested_owned, false));
        };

        let switched = requested.map_or(true, |r| !r.eq_ignore_ascii_case(&name));
        Ok((Some(name), switched))
    }
}

fn distinct_lower<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let set: BTreeSet<String> = values
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    set.into_iter().collect()
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let set: BTreeSet<&str> = values.collect();
    set.into_iter().map(str::to_string).collect()
}
