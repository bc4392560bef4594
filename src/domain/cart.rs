//! Cart data model: items, summary and the reconciliation verdict

use crate::domain::types::{Product, ProductId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// An item in the cart; a snapshot of the product taken when it was scanned
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub barcode: ProductId,
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(product: Product) -> Self {
        Self { barcode: product.id.clone(), product, added_at: Utc::now() }
    }
}

/// Point-in-time view of the ledger
///
/// All fields come from the same lock acquisition, so `items` always matches
/// the weights it was computed against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub items: usize,
    pub actual_weight: f64,
    pub expected_weight: f64,
    pub total_price: f64,
    pub products: Vec<String>,
}

/// Verdict of comparing the scale against the scanned items
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub actual_weight: f64,
    pub expected_weight: f64,
    pub difference: f64,
    pub allowed_tolerance: f64,
    pub verified: bool,
}

/// Which cart products contain an ingredient, and which could not be checked
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngredientReport {
    pub containing: Vec<String>,
    pub unknown: Vec<String>,
}
