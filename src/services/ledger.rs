//! Cart ledger - authoritative record of what has been scanned
//!
//! `expected_weight` only moves on successful scans, `actual_weight` only on
//! weight samples (or a tare). There is no remove operation: a weight drop is
//! reconciled against the totals but never retracts an item.

use crate::domain::cart::{CartItem, CartSummary};
use crate::domain::types::Product;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CartLedger {
    items: Vec<CartItem>,
    expected_weight: f64,
    actual_weight: f64,
    /// Tare epoch of the latest accepted sample
    epoch: u64,
}

impl CartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and grow the expected weight by its unit weight
    pub fn add_item(&mut self, product: Product) -> f64 {
        self.expected_weight += product.unit_weight_grams;
        self.items.push(CartItem::new(product));
        self.expected_weight
    }

    /// Overwrite the actual weight with a sample from `epoch`.
    ///
    /// Samples measured before the latest tare are ignored. Returns whether the
    /// sample was accepted.
    pub fn record_actual_weight(&mut self, epoch: u64, grams: f64) -> bool {
        if epoch < self.epoch {
            debug!(epoch = %epoch, current = %self.epoch, grams = %grams, "stale_weight_sample");
            return false;
        }
        self.epoch = epoch;
        self.actual_weight = grams;
        true
    }

    /// Zero the actual weight for a new tare epoch. The shopping list is kept.
    pub fn tare(&mut self, epoch: u64) {
        self.epoch = self.epoch.max(epoch);
        self.actual_weight = 0.0;
    }

    pub fn snapshot(&self) -> CartSummary {
        CartSummary {
            items: self.items.len(),
            actual_weight: self.actual_weight,
            expected_weight: self.expected_weight,
            total_price: self.items.iter().map(|i| i.product.unit_price).sum(),
            products: self.items.iter().map(|i| i.product.name.clone()).collect(),
        }
    }

    /// Current (actual, expected) weights
    #[inline]
    pub fn weights(&self) -> (f64, f64) {
        (self.actual_weight, self.expected_weight)
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ProductId;

    fn product(id: &str, price: f64, grams: f64) -> Product {
        Product {
            id: ProductId::from(id),
            name: format!("Product {id}"),
            unit_price: price,
            unit_weight_grams: grams,
            ingredients: None,
        }
    }

    #[test]
    fn test_add_item_accumulates() {
        let mut ledger = CartLedger::new();
        assert_eq!(ledger.add_item(product("A", 1.5, 200.0)), 200.0);
        assert_eq!(ledger.add_item(product("A", 1.5, 200.0)), 400.0);

        let summary = ledger.snapshot();
        assert_eq!(summary.items, 2);
        assert_eq!(summary.expected_weight, 400.0);
        assert_eq!(summary.total_price, 3.0);
        assert_eq!(summary.products, vec!["Product A", "Product A"]);
    }

    #[test]
    fn test_tare_keeps_expected_weight() {
        let mut ledger = CartLedger::new();
        ledger.add_item(product("A", 1.0, 200.0));
        ledger.record_actual_weight(0, 210.0);

        ledger.tare(1);
        assert_eq!(ledger.weights(), (0.0, 200.0));
        assert_eq!(ledger.items().len(), 1);
    }

    #[test]
    fn test_stale_sample_ignored_after_tare() {
        let mut ledger = CartLedger::new();
        ledger.record_actual_weight(0, 300.0);
        ledger.tare(1);

        assert!(!ledger.record_actual_weight(0, 300.0));
        assert_eq!(ledger.weights().0, 0.0);

        assert!(ledger.record_actual_weight(1, 5.0));
        assert_eq!(ledger.weights().0, 5.0);
    }
}
