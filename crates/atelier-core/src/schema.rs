//! Category attribute schemas.
//!
//! A schema lists the attributes a product category can be filtered on
//! (`has_belt: boolean`, `material: select`, ...). Schemas are loaded once
//! from a declarative JSON document and never mutated afterwards; the loaded
//! [`CategorySchemas`] value is shared read-only (usually behind an `Arc`).
//!
//! ## Source format
//!
//! ```json
//! {
//!   "Coats": {
//!     "attributes": [
//!       {"key": "has_belt", "type": "boolean", "question": "Does it have a belt?"},
//!       {"key": "material", "type": "select", "question": "Main material?",
//!        "options": ["wool", "leather", "cotton"]}
//!     ]
//!   }
//! }
//! ```
//!
//! Declaration order is significant: [`CategorySchemas::lookup`] returns the
//! first schema whose key is contained in the category name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Value type of a schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Boolean,
    Select,
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Boolean => "boolean",
            AttributeType::Select => "select",
            AttributeType::String => "string",
        }
    }
}

/// One filterable attribute of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub key: String,
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Attribute schema for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySchema {
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

impl CategorySchema {
    /// Find an attribute definition by key.
    pub fn attribute(&self, key: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.key == key)
    }
}

/// Immutable, ordered mapping from category key to its schema.
#[derive(Debug, Clone, Default)]
pub struct CategorySchemas {
    entries: Vec<(String, CategorySchema)>,
}

impl CategorySchemas {
    /// Build from already-parsed entries (declaration order preserved).
    pub fn new(entries: Vec<(String, CategorySchema)>) -> Self {
        Self { entries }
    }

    /// Parse the declarative JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut entries = Vec::with_capacity(root.len());
        for (key, value) in root {
            let schema: CategorySchema = serde_json::from_value(value).map_err(|e| {
                Error::Config(format!("Invalid schema for category '{}': {}", key, e))
            })?;
            entries.push((key, schema));
        }
        debug!(categories = entries.len(), "Parsed category schemas");
        Ok(Self { entries })
    }

    /// Load the schema document from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read schemas from {}: {}", path.display(), e))
        })?;
        let schemas = Self::from_json_str(&raw)?;
        info!(
            subsystem = "core",
            component = "schema_store",
            path = %path.display(),
            categories = schemas.len(),
            "Category schemas loaded"
        );
        Ok(schemas)
    }

    /// Resolve the schema for a product category name.
    ///
    /// Case-insensitive substring containment of the schema key within
    /// `category_name`; the first match in declaration order wins. `None`
    /// means "no attribute filters", not an error.
    pub fn lookup(&self, category_name: &str) -> Option<(&str, &CategorySchema)> {
        let name = category_name.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| name.contains(&key.to_lowercase()))
            .map(|(key, schema)| (key.as_str(), schema))
    }

    /// Exact (case-insensitive) key match.
    pub fn get(&self, key: &str) -> Option<(&str, &CategorySchema)> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(k, schema)| (k.as_str(), schema))
    }

    /// Category keys in declaration order.
    pub fn category_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategorySchema)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "Coat": {
            "attributes": [
                {"key": "has_belt", "type": "boolean", "question": "Does it have a belt?"},
                {"key": "material", "type": "select", "question": "Main material?",
                 "options": ["wool", "leather", "cotton"]}
            ]
        },
        "Pants": {
            "attributes": [
                {"key": "fit", "type": "string", "question": "How does it fit?"}
            ]
        },
        "Raincoat": {
            "attributes": [
                {"key": "hooded", "type": "boolean", "question": "Hooded?"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let schemas = CategorySchemas::from_json_str(FIXTURE).unwrap();
        assert_eq!(schemas.category_names(), vec!["Coat", "Pants", "Raincoat"]);
        assert_eq!(schemas.len(), 3);
    }

    #[test]
    fn test_attribute_types_and_options() {
        let schemas = CategorySchemas::from_json_str(FIXTURE).unwrap();
        let (_, coat) = schemas.get("coat").unwrap();
        let material = coat.attribute("material").unwrap();
        assert_eq!(material.attr_type, AttributeType::Select);
        assert_eq!(material.options.as_ref().unwrap().len(), 3);
        assert_eq!(coat.attribute("has_belt").unwrap().options, None);
    }

    #[test]
    fn test_lookup_is_case_insensitive_substring() {
        let schemas = CategorySchemas::from_json_str(FIXTURE).unwrap();
        let (key, _) = schemas.lookup("Winter COATS").unwrap();
        assert_eq!(key, "Coat");
        let (key, _) = schemas.lookup("slim pants").unwrap();
        assert_eq!(key, "Pants");
    }

    #[test]
    fn test_lookup_first_declared_match_wins() {
        let schemas = CategorySchemas::from_json_str(FIXTURE).unwrap();
        // "Raincoats" contains both "coat" and "raincoat"; "Coat" is declared first.
        let (key, _) = schemas.lookup("Raincoats").unwrap();
        assert_eq!(key, "Coat");
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let schemas = CategorySchemas::from_json_str(FIXTURE).unwrap();
        assert!(schemas.lookup("Shoes").is_none());
    }

    #[test]
    fn test_invalid_attribute_type_is_config_error() {
        let bad = r#"{"Coat": {"attributes": [{"key": "x", "type": "number", "question": "?"}]}}"#;
        let err = CategorySchemas::from_json_str(bad).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let schemas = CategorySchemas::from_path(&path).unwrap();
        assert_eq!(schemas.len(), 3);

        let missing = CategorySchemas::from_path(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
