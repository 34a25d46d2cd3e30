//! Display variant selection.
//!
//! Each result is shown with the image of the variant that best represents
//! the active color/brightness selection:
//!
//! 1. color and brightness both match
//! 2. color matches (no brightness selected)
//! 3. brightness matches (no color selected)
//! 4. first variant with a main image (no color or brightness selected)
//! 5. first variant (no color or brightness selected)
//!
//! A variant without images yields no display image.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::{Product, ProductImage, ProductVariant};

/// The variant and image chosen to represent a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayChoice {
    pub variant_id: Uuid,
    pub color: String,
    pub image: ProductImage,
}

/// Pick the display variant for a product given lowercase selections.
pub fn select_display_variant(
    product: &Product,
    colors: &[String],
    brightness: &[String],
) -> Option<DisplayChoice> {
    let color_match = |v: &ProductVariant| colors.contains(&v.color.trim().to_lowercase());
    let brightness_match = |v: &ProductVariant| {
        v.brightness
            .as_deref()
            .is_some_and(|b| brightness.contains(&b.trim().to_lowercase()))
    };
    let variants = &product.variants;

    let best = match (colors.is_empty(), brightness.is_empty()) {
        (false, false) => variants
            .iter()
            .find(|v| color_match(v) && brightness_match(v)),
        (false, true) => variants.iter().find(|v| color_match(v)),
        (true, false) => variants.iter().find(|v| brightness_match(v)),
        (true, true) => variants
            .iter()
            .find(|v| v.has_main_image())
            .or_else(|| variants.first()),
    }?;

    let image = best.main_image()?.clone();
    Some(DisplayChoice {
        variant_id: best.id,
        color: best.color.clone(),
        image,
    })
}
