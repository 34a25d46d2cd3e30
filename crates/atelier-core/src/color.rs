//! Color family resolution.
//!
//! Maps free-text variant colors ("jet black", "Navy") onto a small set of
//! canonical families used for faceting, and families onto a display value
//! (hex or CSS gradient) for UI swatches. Pure lookups, no I/O.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Family returned for an empty color string.
pub const UNKNOWN_FAMILY: &str = "Unknown";

/// The canonical color families, in display order.
pub const COLOR_GROUPS: &[&str] = &[
    "Beige",
    "Black",
    "Blue",
    "Brown",
    "Green",
    "Grey",
    "Multicolor",
    "Orange",
    "Pink",
    "Purple",
    "Red",
    "White",
    "Yellow",
];

/// Specific color name (lowercase) to family.
const COLOR_MAPPING: &[(&str, &str)] = &[
    // Black
    ("black", "Black"),
    ("jet black", "Black"),
    ("onyx", "Black"),
    ("pitch black", "Black"),
    // Blue
    ("navy", "Blue"),
    ("light blue", "Blue"),
    ("pale blue", "Blue"),
    ("dark turquoise", "Blue"),
    ("sky blue", "Blue"),
    ("teal", "Blue"),
    ("turquoise", "Blue"),
    ("indigo", "Blue"),
    ("royal blue", "Blue"),
    ("baby blue", "Blue"),
    ("cyan", "Blue"),
    ("midnight blue", "Blue"),
    ("denim", "Blue"),
    ("sapphire", "Blue"),
    ("aqua", "Blue"),
    ("blue jeans", "Blue"),
    ("dark grey jeans", "Blue"),
    // Brown
    ("brown", "Brown"),
    ("dark brown", "Brown"),
    ("dusty brown", "Brown"),
    ("golden brown", "Brown"),
    ("coffee", "Brown"),
    ("copper", "Brown"),
    ("mahogany", "Brown"),
    ("taupe", "Brown"),
    ("chocolate", "Brown"),
    ("bronze", "Brown"),
    ("cocoa", "Brown"),
    ("cinnamon", "Brown"),
    // Beige
    ("beige", "Beige"),
    ("tan", "Beige"),
    ("khaki", "Beige"),
    ("camel", "Beige"),
    ("sand", "Beige"),
    ("wheat", "Beige"),
    ("cream", "Beige"),
    ("nude", "Beige"),
    ("ivory", "Beige"),
    ("off-white", "Beige"),
    ("eggshell", "Beige"),
    ("vanilla", "Beige"),
    ("bone", "Beige"),
    // Green
    ("olive", "Green"),
    ("light olive", "Green"),
    ("dark green", "Green"),
    ("dusty green", "Green"),
    ("pale green", "Green"),
    ("brownish green", "Green"),
    ("teal green", "Green"),
    ("steel green", "Green"),
    ("yellow green", "Green"),
    ("emerald", "Green"),
    ("lime", "Green"),
    ("sage", "Green"),
    ("mint", "Green"),
    ("forest green", "Green"),
    ("army green", "Green"),
    ("khaki green", "Green"),
    ("moss", "Green"),
    ("fern", "Green"),
    // Grey
    ("anthracite", "Grey"),
    ("charcoal", "Grey"),
    ("dark grey", "Grey"),
    ("mid grey", "Grey"),
    ("light grey", "Grey"),
    ("silver", "Grey"),
    ("slate", "Grey"),
    ("graphite", "Grey"),
    ("ash", "Grey"),
    ("smoke", "Grey"),
    ("steel", "Grey"),
    ("gunmetal", "Grey"),
    // Orange
    ("orange", "Orange"),
    ("amber", "Orange"),
    ("rust", "Orange"),
    ("burnt orange", "Orange"),
    ("apricot", "Orange"),
    ("tangerine", "Orange"),
    // Pink
    ("pink", "Pink"),
    ("dusty rose", "Pink"),
    ("magenta", "Pink"),
    ("fuchsia", "Pink"),
    ("rose", "Pink"),
    ("salmon", "Pink"),
    ("coral", "Pink"),
    ("hot pink", "Pink"),
    ("blush", "Pink"),
    ("peach", "Pink"),
    ("pastel pink", "Pink"),
    // Purple
    ("purple", "Purple"),
    ("dark violet", "Purple"),
    ("steel violet", "Purple"),
    ("lavender", "Purple"),
    ("lilac", "Purple"),
    ("violet", "Purple"),
    ("plum", "Purple"),
    ("mauve", "Purple"),
    ("orchid", "Purple"),
    ("grape", "Purple"),
    ("aubergine", "Purple"),
    ("hyacinth", "Purple"),
    // Red
    ("red", "Red"),
    ("burgundy", "Red"),
    ("carmine", "Red"),
    ("maroon", "Red"),
    ("crimson", "Red"),
    ("scarlet", "Red"),
    ("brick red", "Red"),
    ("cherry", "Red"),
    ("wine", "Red"),
    ("ruby", "Red"),
    // White
    ("white", "White"),
    ("snow", "White"),
    // Yellow
    ("yellow", "Yellow"),
    ("gold", "Yellow"),
    ("mustard", "Yellow"),
    ("canary", "Yellow"),
    ("lemon", "Yellow"),
    ("light yellow", "Yellow"),
    ("golden", "Yellow"),
    // Special
    ("multicolor", "Multicolor"),
];

/// Family to swatch display value.
const FAMILY_DISPLAY: &[(&str, &str)] = &[
    ("Beige", "#F5F5DC"),
    ("Black", "#000000"),
    ("Blue", "#0000FF"),
    ("Brown", "#8B4513"),
    ("Green", "#008000"),
    ("Grey", "#808080"),
    (
        "Multicolor",
        "linear-gradient(to right, red, orange, yellow, green, blue, indigo, violet)",
    ),
    ("Orange", "#FFA500"),
    ("Pink", "#FFC0CB"),
    ("Purple", "#800080"),
    ("Red", "#FF0000"),
    ("White", "#FFFFFF"),
    ("Yellow", "#FFFF00"),
];

static FAMILY_BY_COLOR: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| COLOR_MAPPING.iter().copied().collect());

static DISPLAY_BY_FAMILY: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| FAMILY_DISPLAY.iter().copied().collect());

/// Resolve a free-text color to its canonical family.
///
/// Unknown colors become their own family (`"dusk"` -> `"Dusk"`), so the
/// function never fails.
pub fn resolve_family(raw: &str) -> String {
    let clean = raw.trim().to_lowercase();
    if clean.is_empty() {
        return UNKNOWN_FAMILY.to_string();
    }
    match FAMILY_BY_COLOR.get(clean.as_str()) {
        Some(family) => (*family).to_string(),
        None => capitalize(&clean),
    }
}

/// Display value (hex or CSS gradient) for a family, if it is canonical.
pub fn family_display_value(family: &str) -> Option<&'static str> {
    DISPLAY_BY_FAMILY.get(family).copied()
}

/// A family facet grouping the concrete colors present in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorFacet {
    pub family: String,
    /// Hex or CSS gradient; `None` for singleton families.
    pub display: Option<String>,
    /// Lowercase member colors, sorted.
    pub colors: Vec<String>,
}

/// Group concrete colors into family facets, ordered by family name.
pub fn group_by_family<'a>(colors: impl IntoIterator<Item = &'a str>) -> Vec<ColorFacet> {
    let mut groups: std::collections::BTreeMap<String, Vec<String>> = Default::default();
    for color in colors {
        let lower = color.trim().to_lowercase();
        if lower.is_empty() {
            continue;
        }
        let members = groups.entry(resolve_family(&lower)).or_default();
        if !members.contains(&lower) {
            members.push(lower);
        }
    }

    groups
        .into_iter()
        .map(|(family, mut colors)| {
            colors.sort();
            ColorFacet {
                display: family_display_value(&family).map(str::to_string),
                family,
                colors,
            }
        })
        .collect()
}

/// Uppercase the first character and lowercase the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
