//! Ingredient analysis of product label images
//!
//! OCR/NLP itself lives outside the engine. This module defines the narrow
//! `IngredientCheck` capability, the text helpers used to turn label text into
//! an ingredient list, and a simulated analyzer with canned label texts.

use crate::domain::errors::AnalysisError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Allergen keywords searched when no ingredient section can be found
const ALLERGENS: [&str; 12] = [
    "peanut", "tree nut", "milk", "egg", "wheat", "soy", "fish", "shellfish", "dairy", "gluten",
    "lactose", "nuts",
];

/// Alternative label spellings for common ingredients
const VARIATIONS: [(&str, &[&str]); 4] = [
    ("msg", &["monosodium glutamate"]),
    ("peanut", &["ground nut", "arachis"]),
    ("gluten", &["wheat", "barley", "rye"]),
    ("milk", &["dairy", "lactose", "whey", "casein"]),
];

/// Reference to a label image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle(pub PathBuf);

impl ImageHandle {
    /// Label image for a product: `<images_dir>/<id>.jpg`
    pub fn for_product(images_dir: &str, product_id: &str) -> Self {
        Self(Path::new(images_dir).join(format!("{product_id}.jpg")))
    }

    pub fn stem(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Result of analysing one label
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientAnalysis {
    pub text: String,
    pub ingredients: Vec<String>,
}

/// Extracts ingredients from a label image
pub trait IngredientCheck: Send + Sync {
    fn extract(&self, image: &ImageHandle) -> Result<IngredientAnalysis, AnalysisError>;
}

/// Split label text into ingredient entries.
///
/// Takes the section starting at "ingredients" up to the next blank line,
/// splits on the first separator present (`,` then `;` then newline) and keeps
/// entries longer than two characters. Falls back to allergen keywords.
pub fn extract_ingredients(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let lower = text.to_ascii_lowercase();
    let mut ingredients = Vec::new();

    if let Some(start) = lower.find("ingredients") {
        let end = lower[start..].find("\n\n").map(|e| start + e).unwrap_or(lower.len());
        let section = &text[start..end];
        let body = section
            .get("ingredients".len()..)
            .map(|s| s.trim_start_matches(':').trim())
            .unwrap_or_default();

        if let Some(separator) = [',', ';', '\n'].into_iter().find(|s| body.contains(*s)) {
            ingredients = body
                .split(separator)
                .map(|i| i.trim().trim_end_matches('.').trim())
                .filter(|i| i.len() > 2)
                .map(str::to_string)
                .collect();
        }
    }

    if ingredients.is_empty() {
        ingredients = ALLERGENS
            .iter()
            .filter(|a| lower.contains(*a))
            .map(|a| a.to_string())
            .collect();
    }

    ingredients
}

/// True when `text` mentions `target` directly or through a known variation
pub fn mentions_ingredient(text: &str, target: &str) -> bool {
    let text = text.to_lowercase();
    let target = target.trim().to_lowercase();
    if target.is_empty() || text.is_empty() {
        return false;
    }
    if text.contains(&target) {
        return true;
    }

    VARIATIONS
        .iter()
        .find(|(name, _)| *name == target)
        .map(|(_, alternatives)| alternatives.iter().any(|alt| text.contains(alt)))
        .unwrap_or(false)
}

/// Analyzer returning canned label texts chosen by image name
#[derive(Debug, Default)]
pub struct SimulatedAnalyzer;

impl IngredientCheck for SimulatedAnalyzer {
    fn extract(&self, image: &ImageHandle) -> Result<IngredientAnalysis, AnalysisError> {
        let stem = image.stem();
        let text = if stem.contains("milk") {
            "Ingredients: Milk, Vitamin D, Vitamin A Palmitate, Salt."
        } else if stem.contains("bread") {
            "Ingredients: Wheat Flour, Water, Yeast, Salt, Sugar, Vegetable Oil."
        } else if stem.contains("peanut") || stem.contains("nuts") {
            "Ingredients: Peanuts, Sugar, Salt, Hydrogenated Vegetable Oil."
        } else {
            "Ingredients: Water, Sugar, Natural Flavors, Citric Acid."
        };

        debug!(image = %image.0.display(), "simulated_ingredient_analysis");
        Ok(IngredientAnalysis { text: text.to_string(), ingredients: extract_ingredients(text) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ingredients_section() {
        let text = "Nutrition facts\n\nIngredients: Wheat Flour, Water, Yeast, Salt.\n\nBest before";
        assert_eq!(extract_ingredients(text), vec!["Wheat Flour", "Water", "Yeast", "Salt"]);
    }

    #[test]
    fn test_extract_ingredients_semicolons() {
        let text = "INGREDIENTS: Oats; Honey; Almonds";
        assert_eq!(extract_ingredients(text), vec!["Oats", "Honey", "Almonds"]);
    }

    #[test]
    fn test_extract_ingredients_allergen_fallback() {
        let text = "May contain traces of milk and soy";
        assert_eq!(extract_ingredients(text), vec!["milk", "soy"]);
        assert!(extract_ingredients("").is_empty());
    }

    #[test]
    fn test_mentions_ingredient_variations() {
        assert!(mentions_ingredient("Whey Powder", "milk"));
        assert!(mentions_ingredient("Wheat Flour", "gluten"));
        assert!(mentions_ingredient("Peanuts", "peanut"));
        assert!(mentions_ingredient("Monosodium Glutamate", "MSG"));
        assert!(!mentions_ingredient("Apple", "milk"));
        assert!(!mentions_ingredient("Apple", ""));
    }

    #[test]
    fn test_image_handle_for_product() {
        let handle = ImageHandle::for_product("assets/images", "5901234123457");
        assert_eq!(handle.0, PathBuf::from("assets/images/5901234123457.jpg"));
        assert_eq!(handle.stem(), "5901234123457");
    }

    #[test]
    fn test_simulated_analyzer() {
        let analyzer = SimulatedAnalyzer;
        let analysis = analyzer.extract(&ImageHandle(PathBuf::from("labels/milk_carton.jpg"))).unwrap();
        assert!(analysis.ingredients.iter().any(|i| i == "Milk"));

        let analysis = analyzer.extract(&ImageHandle(PathBuf::from("labels/soda.jpg"))).unwrap();
        assert_eq!(analysis.ingredients, vec!["Water", "Sugar", "Natural Flavors", "Citric Acid"]);
    }
}
