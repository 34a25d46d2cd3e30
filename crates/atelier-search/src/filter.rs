//! Catalog filter applier.
//!
//! AI-derived filters from the merged state and manual selections from the
//! filter form are unioned per key into one [`FilterSelection`], which is
//! then evaluated as a product predicate. Each step narrows the set:
//!
//! 1. price bounds
//! 2. color and brightness, both satisfied by the same variant when both
//!    are present
//! 3. size membership
//! 4. positive attribute filters
//! 5. negative attribute filters
//! 6. negative colors
//!
//! Within one key the selected values are OR'd; distinct keys are AND'd.
//! Attribute filters only apply to keys the category schema declares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use atelier_core::{AttributeType, CategorySchema, FilterMap, FilterValue, Product};

use crate::merge::AccumulatedFilterState;

/// Key under which extraction reports brightness.
pub const BRIGHTNESS_KEY: &str = "brightness";

/// Selections made directly in the filter form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualFilters {
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub brightness: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Raw per-attribute values, e.g. `{"has_belt": ["true"]}`.
    pub features: BTreeMap<String, Vec<String>>,
}

/// Effective filter selection for one search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    /// Lowercase colors, AI and manual.
    pub colors: Vec<String>,
    /// Lowercase brightness terms, AI and manual.
    pub brightness: Vec<String>,
    pub sizes: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Positive attribute filters (schema keys only), with their type.
    pub features: BTreeMap<String, (AttributeType, Vec<FilterValue>)>,
    /// Negative attribute filters (schema keys only), with their type.
    pub negative_features: BTreeMap<String, (AttributeType, Vec<FilterValue>)>,
    pub negative_colors: Vec<String>,
}

impl FilterSelection {
    /// Union the merged AI state with manual selections.
    ///
    /// Without a schema no attribute filters apply.
    pub fn build(
        state: &AccumulatedFilterState,
        manual: &ManualFilters,
        schema: Option<&CategorySchema>,
    ) -> Self {
        let mut colors: Vec<String> = Vec::new();
        for color in manual.colors.iter().chain(state.merged_colors.iter()) {
            push_lower(&mut colors, color);
        }

        let mut brightness: Vec<String> = Vec::new();
        if schema.is_some() {
            let ai = state
                .merged_filters
                .get(BRIGHTNESS_KEY)
                .into_iter()
                .flatten()
                .map(|v| v.to_string());
            for value in ai.chain(manual.brightness.iter().cloned()) {
                push_lower(&mut brightness, &value);
            }
        }

        let mut sizes: Vec<String> = Vec::new();
        for size in &manual.sizes {
            let size = size.trim();
            if !size.is_empty() && !sizes.iter().any(|s| s == size) {
                sizes.push(size.to_string());
            }
        }

        let mut features = BTreeMap::new();
        let mut negative_features = BTreeMap::new();
        if let Some(schema) = schema {
            for attr in &schema.attributes {
                if attr.key == BRIGHTNESS_KEY {
                    continue;
                }
                let mut values: Vec<FilterValue> = Vec::new();
                let ai = state.merged_filters.get(&attr.key).into_iter().flatten().cloned();
                let form = manual
                    .features
                    .get(&attr.key)
                    .into_iter()
                    .flatten()
                    .filter_map(|raw| FilterValue::normalize(raw));
                for value in ai.chain(form) {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                if !values.is_empty() {
                    features.insert(attr.key.clone(), (attr.attr_type, values));
                }

                if let Some(excluded) = state.merged_negative_filters.get(&attr.key) {
                    if !excluded.is_empty() {
                        negative_features.insert(attr.key.clone(), (attr.attr_type, excluded.clone()));
                    }
                }
            }
        }

        let mut negative_colors: Vec<String> = Vec::new();
        for color in &state.merged_negative_colors {
            push_lower(&mut negative_colors, color);
        }

        Self {
            colors,
            brightness,
            sizes,
            min_price: manual.min_price,
            max_price: manual.max_price,
            features,
            negative_features,
            negative_colors,
        }
    }

    /// Active attribute values as shown in the filter UI.
    ///
    /// A boolean attribute excluded as `true` displays as a selected
    /// `false`, and vice versa. Display only; predicates are unaffected.
    pub fn display_features(&self) -> FilterMap {
        let mut shown: FilterMap = self
            .features
            .iter()
            .map(|(k, (_, values))| (k.clone(), values.clone()))
            .collect();

        for (key, (attr_type, excluded)) in &self.negative_features {
            if *attr_type != AttributeType::Boolean {
                continue;
            }
            if excluded.contains(&FilterValue::Bool(true)) {
                shown.insert(key.clone(), vec![FilterValue::Bool(false)]);
            } else if excluded.contains(&FilterValue::Bool(false)) {
                shown.insert(key.clone(), vec![FilterValue::Bool(true)]);
            }
        }
        shown
    }

    /// Whether a product passes every step.
    pub fn matches(&self, product: &Product) -> bool {
        self.price_ok(product)
            && self.variant_ok(product)
            && self.size_ok(product)
            && self.features_ok(product)
            && self.negative_features_ok(product)
            && self.negative_colors_ok(product)
    }

    /// Keep matching products, preserving order.
    pub fn apply(&self, products: Vec<Product>) -> Vec<Product> {
        let before = products.len();
        let kept: Vec<Product> = products
            .into_iter()
            .filter(|p| {
                let ok = self.matches(p);
                trace!(product_id = %p.id, matched = ok, "Catalog filter");
                ok
            })
            .collect();
        debug!(
            subsystem = "search",
            component = "catalog_filter",
            before,
            result_count = kept.len(),
            "Catalog filtered"
        );
        kept
    }

    fn price_ok(&self, product: &Product) -> bool {
        self.min_price.map_or(true, |min| product.price >= min)
            && self.max_price.map_or(true, |max| product.price <= max)
    }

    fn variant_ok(&self, product: &Product) -> bool {
        if self.colors.is_empty() && self.brightness.is_empty() {
            return true;
        }
        product.variants.iter().any(|v| {
            let color_ok =
                self.colors.is_empty() || self.colors.contains(&v.color.trim().to_lowercase());
            let brightness_ok = self.brightness.is_empty()
                || v.brightness
                    .as_deref()
                    .is_some_and(|b| self.brightness.contains(&b.trim().to_lowercase()));
            color_ok && brightness_ok
        })
    }

    fn size_ok(&self, product: &Product) -> bool {
        self.sizes.is_empty()
            || product
                .variants
                .iter()
                .any(|v| self.sizes.iter().any(|s| *s == v.size))
    }

    fn features_ok(&self, product: &Product) -> bool {
        self.features.iter().all(|(key, (_, values))| {
            product
                .feature(key)
                .is_some_and(|stored| values.iter().any(|v| v.matches_json(stored)))
        })
    }

    fn negative_features_ok(&self, product: &Product) -> bool {
        self.negative_features.iter().all(|(key, (_, excluded))| {
            product
                .feature(key)
                .map_or(true, |stored| !excluded.iter().any(|v| v.matches_json(stored)))
        })
    }

    fn negative_colors_ok(&self, product: &Product) -> bool {
        self.negative_colors.is_empty()
            || !product
                .variants
                .iter()
                .any(|v| self.negative_colors.contains(&v.color.trim().to_lowercase()))
    }
}

fn push_lower(target: &mut Vec<String>, value: &str) {
    let lower = value.trim().to_lowercase();
    if !lower.is_empty() && !target.contains(&lower) {
        target.push(lower);
    }
}
