//! Prompt builders for search extraction and catalog enrichment.

use atelier_core::{Brightness, CategorySchema};

/// Category classification prompt.
///
/// With a context category, the model is told that explicit synonyms of
/// another category switch, while feature, color and style terms keep it.
pub fn classification_prompt(query: &str, categories: &[&str], context: Option<&str>) -> String {
    let mut prompt = format!(
        "Classify query '{}' into one of: {:?}. Return ONLY category name or 'Unknown'.",
        query, categories
    );

    if let Some(ctx) = context {
        prompt.push_str(&format!(
            "\nContext: User is currently viewing '{}' category. ",
            ctx
        ));
        prompt.push_str("Instructions for Context:\n");
        prompt.push_str(
            "1. IF the query is a synonym or exact match for a DIFFERENT category \
             (e.g. 'coat', 'trousers'), you MUST return that new category.\n",
        );
        prompt.push_str(&format!(
            "2. ONLY keep '{ctx}' if the query describes a FEATURE, COLOR, or STYLE \
             (e.g. 'black', 'leather', 'belt') of {ctx}.\n"
        ));
        prompt.push_str(
            "3. If the query implies an item that completely contradicts the current category, switch.",
        );
    }

    prompt
}

/// Feature and color extraction prompt for a resolved category.
pub fn extraction_prompt(
    query: &str,
    category: &str,
    schema: &CategorySchema,
    available_colors: &[String],
) -> String {
    let mut features: Vec<String> = schema
        .attributes
        .iter()
        .map(|attr| {
            let mut item = format!("Feature '{}': {}", attr.key, attr.question);
            if let Some(options) = &attr.options {
                item.push_str(&format!(" (Options: {})", options.join(", ")));
            }
            item
        })
        .collect();

    let brightness: Vec<&str> = Brightness::ALL.iter().map(|b| b.as_str()).collect();
    features.push(format!(
        "Feature 'brightness': select. What is the overall brightness of the product's color? (Options: {})",
        brightness.join(", ")
    ));

    let mut prompt = format!("Analyze search query: '{}'\n", query);
    prompt.push_str(&format!(
        "Context: User is searching in category '{}'.\n",
        category
    ));
    prompt.push_str(&format!(
        "Available Colors: {}. Prioritize these.\n\n",
        available_colors.join(", ")
    ));
    prompt.push_str("Available Features:\n");
    prompt.push_str(&features.join("\n"));
    prompt.push_str("\n\n");

    prompt.push_str(EXTRACTION_INSTRUCTIONS);
    prompt
}

const EXTRACTION_INSTRUCTIONS: &str = r#"Instructions:
1. Identify features from the list (including 'brightness') that are EXPLICITLY mentioned or VERY STRONGLY implied by the query.
2. **CRITICAL COLOR DETECTION**: If a term is an exact match for a color in 'Available Colors', extract it ONLY as a color. DO NOT infer brightness or color_pattern from these exact color matches.
3. Extract values for identified features. Use exact option names (e.g., 'dark' for 'brightness').
4. **AVOID INFERENCE**: DO NOT infer 'brightness' or 'color_pattern' unless EXPLICITLY mentioned or very strongly implied, and only if no direct color match was found (e.g., 'dark coat' implies brightness:dark, but 'black coat' implies color:black, NOT brightness:dark or color_pattern:solid).
5. EXCLUSIONS (Negative Logic): If the query explicitly uses NEGATIVE language (e.g., 'not', 'no', 'without', 'except'), extract those features into `negative_filters` and `negative_colors`.
   - Example: 'not red' -> negative_colors: ['red'] (always lowercase)
   - Example: 'no zipper' -> negative_filters: {'has_zipper': true}
6. SUGGESTIONS: If the query is VAGUE or implies a specific need without technical detail, suggest ONE attribute from the schema.
7. Return JSON:
   {
     "filters": {"feature_key": ["value"]},
     "colors": [...],
     "negative_filters": {"feature_key": ["value_to_exclude"]},
     "negative_colors": ["Color_to_exclude"],
     "suggestion": {"text": "...", "suggested_query": "..."}
   }
8. IMPORTANT: If a feature is NOT mentioned, DO NOT include it in the output. Do NOT return 'unknown'.
"#;

/// Prompt asking for a product's feature map from its text and images.
pub fn product_features_prompt(
    name: &str,
    description: &str,
    category_key: &str,
    schema: &CategorySchema,
) -> String {
    let mut prompt = format!("Analyze product: '{}' (Category: {}).\n", name, category_key);
    if !description.trim().is_empty() {
        prompt.push_str(&format!("Desc: {}\n", description));
    }

    let mut structure = serde_json::Map::new();
    for attr in &schema.attributes {
        let mut spec = format!("{}. {}", attr.attr_type.as_str(), attr.question);
        if let Some(options) = &attr.options {
            spec.push_str(&format!(" Options: {:?}", options));
        }
        structure.insert(attr.key.clone(), serde_json::Value::String(spec));
    }

    prompt.push_str("Return JSON strictly matching schema:\n");
    prompt.push_str(&serde_json::Value::Object(structure).to_string());
    prompt
}

/// Prompt classifying a product image as light, medium or dark.
pub const BRIGHTNESS_PROMPT: &str = "Given this product image, classify the overall brightness \
of the main product's color as one of 'light', 'medium', or 'dark'.\n\
Return a single JSON object with one key 'brightness' and its corresponding value.\n\
Example: {\"brightness\": \"dark\"}";
