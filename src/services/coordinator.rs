//! Coordination loop - the single consumer of channel events
//!
//! Weight samples update the ledger's actual weight and trigger a
//! reconciliation on every stable tick. Decoded symbols are resolved against
//! the catalog and appended to the ledger. A periodic tick re-verifies the
//! cart independently of sensor traffic. With verification disabled the
//! ledger is still maintained but nothing is reconciled or published.

use crate::domain::cart::ReconciliationResult;
use crate::domain::types::{ScanOutcome, WeightState};
use crate::infra::metrics::Metrics;
use crate::io::catalog::ProductLookup;
use crate::services::ledger::CartLedger;
use crate::services::reconciler::Reconciler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::ChannelEvent;

/// Resolve a barcode and, if known, append it to the ledger
pub(crate) fn apply_scan(
    barcode: &str,
    lookup: &dyn ProductLookup,
    ledger: &Mutex<CartLedger>,
    metrics: &Metrics,
) -> ScanOutcome {
    let barcode = barcode.trim();
    match lookup.find(barcode) {
        Some(product) => {
            let name = product.name.clone();
            let unit_weight = product.unit_weight_grams;
            let expected_weight = ledger.lock().add_item(product);
            metrics.record_scan(true);
            info!(
                barcode = %barcode,
                product = %name,
                unit_weight_grams = %unit_weight,
                expected_grams = %expected_weight,
                "item_added"
            );
            ScanOutcome::Added { name, expected_weight }
        }
        None => {
            metrics.record_scan(false);
            warn!(barcode = %barcode, "product_not_found");
            ScanOutcome::NotFound
        }
    }
}

pub struct Coordinator {
    ledger: Arc<Mutex<CartLedger>>,
    lookup: Arc<dyn ProductLookup>,
    reconciler: Reconciler,
    result_tx: Arc<watch::Sender<Option<ReconciliationResult>>>,
    metrics: Arc<Metrics>,
    /// `None` when weight verification is disabled
    verify_interval: Option<Duration>,
}

impl Coordinator {
    pub fn new(
        ledger: Arc<Mutex<CartLedger>>,
        lookup: Arc<dyn ProductLookup>,
        reconciler: Reconciler,
        result_tx: Arc<watch::Sender<Option<ReconciliationResult>>>,
        metrics: Arc<Metrics>,
        verify_interval: Option<Duration>,
    ) -> Self {
        Self { ledger, lookup, reconciler, result_tx, metrics, verify_interval }
    }

    /// Consume events until shutdown or until every producer is gone
    pub async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<ChannelEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            verify_interval_ms = ?self.verify_interval.map(|d| d.as_millis()),
            "coordinator_started"
        );

        // Disabled verification still needs a timer to select on
        let mut verify_timer = interval(self.verify_interval.unwrap_or(Duration::from_secs(3600)));
        verify_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("coordinator_shutdown");
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e),
                        None => break,
                    }
                }
                _ = verify_timer.tick() => {
                    if self.verify_interval.is_some() {
                        self.verify();
                    }
                }
            }
        }

        info!("coordinator_stopped");
    }

    /// Handle a single channel event
    pub fn process_event(&mut self, event: ChannelEvent) {
        let process_start = Instant::now();

        match event {
            ChannelEvent::Weight(weight) => {
                let accepted =
                    self.ledger.lock().record_actual_weight(weight.epoch, weight.sample.grams);
                if accepted && weight.state == WeightState::Stable && self.verify_interval.is_some() {
                    self.verify();
                }
            }
            ChannelEvent::WeightFault { error } => {
                debug!(error = %error, "coordinator_weight_fault");
            }
            ChannelEvent::Scan(scan) => {
                debug!(
                    symbol = %scan.symbol_type.as_str(),
                    scanned_at = %scan.scanned_at,
                    "coordinator_scan"
                );
                apply_scan(&scan.data, self.lookup.as_ref(), &self.ledger, &self.metrics);
            }
            ChannelEvent::ScanFault { error } => {
                debug!(error = %error, "coordinator_scan_fault");
            }
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
    }

    /// Reconcile the current totals and publish the result
    pub fn verify(&mut self) -> ReconciliationResult {
        let (actual, expected) = self.ledger.lock().weights();
        let result = self.reconciler.evaluate(actual, expected);
        self.result_tx.send_replace(Some(result));
        result
    }
}
