//! Domain models for atelier.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// FILTER VALUES
// =============================================================================

/// A single attribute filter value: a boolean or a lowercase string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Text(String),
}

impl FilterValue {
    /// Normalize a textual value: trimmed, lowercased, `"true"`/`"false"`
    /// become booleans, empty input yields `None`.
    pub fn normalize(raw: &str) -> Option<Self> {
        let clean = raw.trim().to_lowercase();
        match clean.as_str() {
            "" => None,
            "true" => Some(FilterValue::Bool(true)),
            "false" => Some(FilterValue::Bool(false)),
            _ => Some(FilterValue::Text(clean)),
        }
    }

    /// Convert a loosely-typed JSON value (as produced by a model).
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(b) => Some(FilterValue::Bool(*b)),
            JsonValue::String(s) => Self::normalize(s),
            other => Self::normalize(&other.to_string()),
        }
    }

    /// The effective value implied by excluding this value.
    ///
    /// Booleans flip; any non-empty text excludes to `false`.
    pub fn negated(&self) -> FilterValue {
        match self {
            FilterValue::Bool(b) => FilterValue::Bool(!b),
            FilterValue::Text(s) => FilterValue::Bool(s.is_empty()),
        }
    }

    /// Whether a stored feature value satisfies this filter value.
    ///
    /// Booleans need an exact boolean; text compares case-insensitively.
    pub fn matches_json(&self, stored: &JsonValue) -> bool {
        match (self, stored) {
            (FilterValue::Bool(want), JsonValue::Bool(have)) => want == have,
            (FilterValue::Text(want), JsonValue::String(have)) => {
                have.trim().eq_ignore_ascii_case(want)
            }
            (FilterValue::Text(want), JsonValue::Number(n)) => n.to_string() == *want,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FilterValue::Bool(b) => Some(*b),
            FilterValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            FilterValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

/// Attribute key to its values.
pub type FilterMap = BTreeMap<String, Vec<FilterValue>>;

// =============================================================================
// QUERY RESOLUTION
// =============================================================================

/// Normalized form of a raw query: trimmed and lowercased.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A "did you mean / try adding" hint produced for vague queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub suggested_query: String,
}

/// Structured interpretation of one search phrase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub negative_filters: FilterMap,
    #[serde(default)]
    pub negative_colors: Vec<String>,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
}

impl ResolvedQuery {
    /// The "no signal" result returned when resolution fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result carrying only a category.
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    /// True when the query contributed nothing usable.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.filters.is_empty()
            && self.colors.is_empty()
            && self.negative_filters.is_empty()
            && self.negative_colors.is_empty()
    }
}

/// Durable record of a resolved query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSearchQuery {
    pub id: Uuid,
    /// Normalized query text (unique).
    pub query_text: String,
    pub category_name: Option<String>,
    pub result_data: ResolvedQuery,
    pub hit_count: i64,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

// =============================================================================
// CATALOG
// =============================================================================

/// Perceived brightness of a variant's color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brightness {
    Light,
    Medium,
    Dark,
}

impl Brightness {
    pub const ALL: [Brightness; 3] = [Brightness::Light, Brightness::Medium, Brightness::Dark];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brightness::Light => "light",
            Brightness::Medium => "medium",
            Brightness::Dark => "dark",
        }
    }

    /// Parse a brightness term, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Some(Brightness::Light),
            "medium" => Some(Brightness::Medium),
            "dark" => Some(Brightness::Dark),
            _ => None,
        }
    }
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored product image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: Uuid,
    /// Storage path of the image file.
    pub path: String,
    pub is_main: bool,
}

impl ProductImage {
    pub fn mime_type(&self) -> &'static str {
        if self.path.to_lowercase().ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        }
    }
}

/// A purchasable color/size combination of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub color: String,
    pub size: String,
    pub brightness: Option<String>,
    pub stock_quantity: i32,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

impl ProductVariant {
    /// Main image, falling back to the first image.
    pub fn main_image(&self) -> Option<&ProductImage> {
        self.images
            .iter()
            .find(|i| i.is_main)
            .or_else(|| self.images.first())
    }

    pub fn has_main_image(&self) -> bool {
        self.images.iter().any(|i| i.is_main)
    }
}

/// A catalog product with its variants and generated feature map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Semi-structured attributes keyed by schema attribute key.
    #[serde(default)]
    pub features: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
}

impl Product {
    pub fn feature(&self, key: &str) -> Option<&JsonValue> {
        self.features.get(key)
    }

    /// Whether the product belongs to a category (case-insensitive).
    pub fn in_category(&self, category: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_booleans_and_text() {
        assert_eq!(FilterValue::normalize(" TRUE "), Some(FilterValue::Bool(true)));
        assert_eq!(FilterValue::normalize("False"), Some(FilterValue::Bool(false)));
        assert_eq!(
            FilterValue::normalize("  Leather "),
            Some(FilterValue::Text("leather".into()))
        );
        assert_eq!(FilterValue::normalize("   "), None);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(FilterValue::from_json(&json!(true)), Some(true.into()));
        assert_eq!(FilterValue::from_json(&json!("Wool")), Some("wool".into()));
        assert_eq!(FilterValue::from_json(&json!(3)), Some("3".into()));
        assert_eq!(FilterValue::from_json(&JsonValue::Null), None);
    }

    #[test]
    fn test_negated() {
        assert_eq!(FilterValue::Bool(true).negated(), FilterValue::Bool(false));
        assert_eq!(FilterValue::Bool(false).negated(), FilterValue::Bool(true));
        assert_eq!(FilterValue::from("red").negated(), FilterValue::Bool(false));
    }

    #[test]
    fn test_matches_json() {
        assert!(FilterValue::Bool(true).matches_json(&json!(true)));
        assert!(!FilterValue::Bool(true).matches_json(&json!("true")));
        assert!(FilterValue::from("wool").matches_json(&json!("Wool")));
        assert!(!FilterValue::from("wool").matches_json(&json!("cotton")));
    }

    #[test]
    fn test_filter_value_serde_untagged() {
        let values: Vec<FilterValue> = serde_json::from_str(r#"[true, "leather"]"#).unwrap();
        assert_eq!(values, vec![FilterValue::Bool(true), "leather".into()]);
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[true,"leather"]"#);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Black COAT "), "black coat");
    }

    #[test]
    fn test_resolved_query_is_empty() {
        assert!(ResolvedQuery::empty().is_empty());
        assert!(!ResolvedQuery::with_category("Coats").is_empty());

        let only_suggestion = ResolvedQuery {
            suggestion: Some(Suggestion::default()),
            ..Default::default()
        };
        assert!(only_suggestion.is_empty());
    }

    #[test]
    fn test_resolved_query_deserializes_partial() {
        let rq: ResolvedQuery = serde_json::from_str(r#"{"category": "Coats"}"#).unwrap();
        assert_eq!(rq.category.as_deref(), Some("Coats"));
        assert!(rq.filters.is_empty());
    }

    #[test]
    fn test_brightness_parse() {
        assert_eq!(Brightness::parse(" Dark"), Some(Brightness::Dark));
        assert_eq!(Brightness::parse("dim"), None);
        assert_eq!(Brightness::Light.to_string(), "light");
    }

    #[test]
    fn test_variant_main_image_fallback() {
        let img = |path: &str, is_main| ProductImage {
            id: Uuid::new_v4(),
            path: path.to_string(),
            is_main,
        };
        let mut variant = ProductVariant {
            id: Uuid::new_v4(),
            color: "Black".into(),
            size: "M".into(),
            brightness: None,
            stock_quantity: 1,
            images: vec![img("a.jpg", false), img("b.PNG", true)],
        };
        assert_eq!(variant.main_image().unwrap().path, "b.PNG");
        assert_eq!(variant.main_image().unwrap().mime_type(), "image/png");

        variant.images[1].is_main = false;
        assert_eq!(variant.main_image().unwrap().path, "a.jpg");
        assert!(!variant.has_main_image());
    }
}
