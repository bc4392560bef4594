//! Reconciliation of the scale against the scanned items
//!
//! The verdict is advisory: it never blocks cart mutation. An empty cart has a
//! zero tolerance band, so anything on the scale is flagged.

use crate::domain::cart::ReconciliationResult;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Compare actual and expected weight within `tolerance` (a fraction of expected)
pub fn reconcile(actual: f64, expected: f64, tolerance: f64) -> ReconciliationResult {
    let allowed = expected * tolerance;
    let difference = (actual - expected).abs();
    ReconciliationResult {
        actual_weight: actual,
        expected_weight: expected,
        difference,
        allowed_tolerance: allowed,
        verified: difference <= allowed,
    }
}

/// Tracks the verdict across evaluations and logs when it flips
pub struct Reconciler {
    tolerance: f64,
    last_verdict: Option<bool>,
    metrics: Arc<Metrics>,
}

impl Reconciler {
    pub fn new(tolerance: f64, metrics: Arc<Metrics>) -> Self {
        Self { tolerance, last_verdict: None, metrics }
    }

    pub fn evaluate(&mut self, actual: f64, expected: f64) -> ReconciliationResult {
        let result = reconcile(actual, expected, self.tolerance);
        let flipped = self.last_verdict != Some(result.verified);
        let became_discrepant = flipped && !result.verified;

        if flipped {
            if result.verified {
                info!(
                    actual_grams = %result.actual_weight,
                    expected_grams = %result.expected_weight,
                    "cart_weight_verified"
                );
            } else {
                warn!(
                    actual_grams = %result.actual_weight,
                    expected_grams = %result.expected_weight,
                    difference = %result.difference,
                    allowed = %result.allowed_tolerance,
                    "cart_weight_discrepancy"
                );
            }
        } else {
            trace!(verified = %result.verified, difference = %result.difference, "reconciled");
        }

        self.last_verdict = Some(result.verified);
        self.metrics.record_reconciliation(became_discrepant);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cart() {
        assert!(reconcile(0.0, 0.0, 0.1).verified);

        let result = reconcile(50.0, 0.0, 0.1);
        assert!(!result.verified);
        assert_eq!(result.allowed_tolerance, 0.0);
        assert_eq!(result.difference, 50.0);
    }

    #[test]
    fn test_within_and_outside_band() {
        let result = reconcile(205.0, 200.0, 0.1);
        assert!(result.verified);
        assert_eq!(result.difference, 5.0);
        assert_eq!(result.allowed_tolerance, 20.0);

        assert!(!reconcile(400.0, 200.0, 0.1).verified);
        assert!(reconcile(180.0, 200.0, 0.1).verified);
    }

    #[test]
    fn test_discrepancy_counted_on_flip_only() {
        let metrics = Arc::new(Metrics::new());
        let mut reconciler = Reconciler::new(0.1, metrics.clone());

        reconciler.evaluate(0.0, 0.0);
        reconciler.evaluate(400.0, 200.0);
        reconciler.evaluate(400.0, 200.0);
        assert_eq!(metrics.discrepancies_total(), 1);

        reconciler.evaluate(200.0, 200.0);
        reconciler.evaluate(50.0, 200.0);
        assert_eq!(metrics.discrepancies_total(), 2);
    }
}
