//! Ingredient verification across the products in the cart
//!
//! Products carrying an ingredient list are checked directly. Products without
//! one are analysed from their label image once and the result is cached.
//! When analysis is unavailable the product is reported as unknown, never as
//! "does not contain".

use crate::domain::cart::IngredientReport;
use crate::domain::types::{Product, ProductId};
use crate::io::ingredients::{mentions_ingredient, IngredientCheck, ImageHandle};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct IngredientVerifier {
    check: Option<Arc<dyn IngredientCheck>>,
    images_dir: String,
    /// Ingredient lists obtained from label analysis, by product
    cache: Mutex<FxHashMap<ProductId, Vec<String>>>,
}

impl IngredientVerifier {
    pub fn new(check: Option<Arc<dyn IngredientCheck>>, images_dir: impl Into<String>) -> Self {
        Self { check, images_dir: images_dir.into(), cache: Mutex::new(FxHashMap::default()) }
    }

    /// Classify each distinct product by whether it contains `ingredient`
    pub fn report<'a>(
        &self,
        products: impl IntoIterator<Item = &'a Product>,
        ingredient: &str,
    ) -> IngredientReport {
        let mut report = IngredientReport::default();
        let mut seen = FxHashSet::default();

        for product in products {
            if !seen.insert(product.id.clone()) {
                continue;
            }
            match self.ingredients_for(product) {
                Some(list) => {
                    if list.iter().any(|i| mentions_ingredient(i, ingredient)) {
                        report.containing.push(product.name.clone());
                    }
                }
                None => report.unknown.push(product.name.clone()),
            }
        }

        info!(
            ingredient = %ingredient,
            containing = %report.containing.len(),
            unknown = %report.unknown.len(),
            "ingredient_verified"
        );
        report
    }

    fn ingredients_for(&self, product: &Product) -> Option<Vec<String>> {
        if let Some(list) = &product.ingredients {
            return Some(list.clone());
        }
        if let Some(list) = self.cache.lock().get(&product.id) {
            return Some(list.clone());
        }

        let check = self.check.as_ref()?;
        let image = ImageHandle::for_product(&self.images_dir, &product.id.0);
        match check.extract(&image) {
            Ok(analysis) => {
                debug!(product = %product.id, ingredients = ?analysis.ingredients, "label_analysed");
                self.cache.lock().insert(product.id.clone(), analysis.ingredients.clone());
                Some(analysis.ingredients)
            }
            Err(e) => {
                warn!(product = %product.id, error = %e, "ingredient_analysis_failed");
                None
            }
        }
    }
}
