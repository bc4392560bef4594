//! Product lookup
//!
//! The engine only needs "find a product by barcode". The in-memory catalog
//! is loaded once at startup from a JSON array of products, or falls back to
//! a small built-in demo catalog.

use crate::domain::types::{Product, ProductId};
use anyhow::Context;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Resolves a scanned identifier to a product record
pub trait ProductLookup: Send + Sync {
    fn find(&self, id: &str) -> Option<Product>;
}

/// Read-only catalog held in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: FxHashMap<String, Product>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let mut catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.id.0.clone(), product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Load a JSON array of products
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        let products: Vec<Product> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;

        let catalog = Self::with_products(products);
        info!(file = %path.display(), products = %catalog.len(), "catalog_loaded");
        Ok(catalog)
    }

    /// Built-in demo products
    pub fn demo() -> Self {
        fn product(id: &str, name: &str, price: f64, grams: f64, ingredients: &[&str]) -> Product {
            Product {
                id: ProductId::from(id),
                name: name.to_string(),
                unit_price: price,
                unit_weight_grams: grams,
                ingredients: Some(ingredients.iter().map(|s| s.to_string()).collect()),
            }
        }

        Self::with_products([
            product("9780201379624", "Design Patterns", 49.99, 950.0, &[]),
            product("7501234567890", "Apple", 1.99, 200.0, &["Apple"]),
            product("5901234123457", "Milk", 3.49, 1000.0, &["Milk", "Vitamin D", "Calcium"]),
            product(
                "4005900123451",
                "Peanut Butter",
                4.29,
                340.0,
                &["Peanuts", "Sugar", "Salt", "Hydrogenated Vegetable Oil"],
            ),
            product(
                "0614141123456",
                "Bread",
                2.49,
                500.0,
                &["Wheat Flour", "Water", "Yeast", "Salt", "Sugar"],
            ),
        ])
    }
}

impl ProductLookup for InMemoryCatalog {
    fn find(&self, id: &str) -> Option<Product> {
        self.products.get(id.trim()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_demo_catalog_lookup() {
        let catalog = InMemoryCatalog::demo();
        let apple = catalog.find("7501234567890").unwrap();
        assert_eq!(apple.name, "Apple");
        assert_eq!(apple.unit_weight_grams, 200.0);
        assert!(catalog.find("0000000000000").is_none());
    }

    #[test]
    fn test_lookup_trims_identifier() {
        let catalog = InMemoryCatalog::demo();
        assert!(catalog.find(" 5901234123457\r").is_some());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "A", "name": "Thing A", "unit_price": 1.5, "unit_weight_grams": 200.0}},
                {{"id": "B", "name": "Thing B", "unit_price": 2.0, "unit_weight_grams": 50.0,
                  "ingredients": ["Oats"]}}
            ]"#
        )
        .unwrap();

        let catalog = InMemoryCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.find("A").unwrap().ingredients, None);
        assert_eq!(catalog.find("B").unwrap().ingredients, Some(vec!["Oats".to_string()]));
    }

    #[test]
    fn test_from_json_file_missing() {
        assert!(InMemoryCatalog::from_json_file("/nonexistent/catalog.json").is_err());
    }
}
