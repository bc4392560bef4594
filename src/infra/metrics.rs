//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All atomics use Relaxed ordering: these are statistical counters only and
//! must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Weight samples read successfully (monotonic)
    weight_samples_total: AtomicU64,
    /// ItemAdded transitions fired by the weight channel (monotonic)
    weight_added_total: AtomicU64,
    /// ItemRemoved transitions fired by the weight channel (monotonic)
    weight_removed_total: AtomicU64,
    /// Failed scale reads (monotonic)
    weight_faults_total: AtomicU64,
    /// Symbols decoded by the scan channel or passed to on_scan (monotonic)
    scans_total: AtomicU64,
    /// Scans with no catalog entry (monotonic)
    scans_unknown_total: AtomicU64,
    /// Failed scanner reads (monotonic)
    scanner_faults_total: AtomicU64,
    /// Items appended to the ledger (monotonic)
    items_added_total: AtomicU64,
    /// Reconciliation passes (monotonic)
    reconciliations_total: AtomicU64,
    /// Verified -> discrepant transitions (monotonic)
    discrepancies_total: AtomicU64,
    /// Channel events dropped because the coordinator queue was full (monotonic)
    events_dropped_total: AtomicU64,
    /// Events handled since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of handling latencies (reset on report)
    latency_sum_us: AtomicU64,
    /// Max handling latency (reset on report)
    latency_max_us: AtomicU64,
    /// Handling latency histogram (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            weight_samples_total: AtomicU64::new(0),
            weight_added_total: AtomicU64::new(0),
            weight_removed_total: AtomicU64::new(0),
            weight_faults_total: AtomicU64::new(0),
            scans_total: AtomicU64::new(0),
            scans_unknown_total: AtomicU64::new(0),
            scanner_faults_total: AtomicU64::new(0),
            items_added_total: AtomicU64::new(0),
            reconciliations_total: AtomicU64::new(0),
            discrepancies_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_weight_sample(&self) {
        self.weight_samples_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_weight_added(&self) {
        self.weight_added_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_weight_removed(&self) {
        self.weight_removed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_weight_fault(&self) {
        self.weight_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scan(&self, found: bool) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        if found {
            self.items_added_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scans_unknown_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_scanner_fault(&self) {
        self.scanner_faults_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconciliation(&self, became_discrepant: bool) {
        self.reconciliations_total.fetch_add(1, Ordering::Relaxed);
        if became_discrepant {
            self.discrepancies_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a coordinator event was handled with given latency
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    pub fn scans_total(&self) -> u64 {
        self.scans_total.load(Ordering::Relaxed)
    }

    pub fn scans_unknown_total(&self) -> u64 {
        self.scans_unknown_total.load(Ordering::Relaxed)
    }

    pub fn weight_faults_total(&self) -> u64 {
        self.weight_faults_total.load(Ordering::Relaxed)
    }

    pub fn weight_added_total(&self) -> u64 {
        self.weight_added_total.load(Ordering::Relaxed)
    }

    pub fn weight_removed_total(&self) -> u64 {
        self.weight_removed_total.load(Ordering::Relaxed)
    }

    pub fn scanner_faults_total(&self) -> u64 {
        self.scanner_faults_total.load(Ordering::Relaxed)
    }

    pub fn discrepancies_total(&self) -> u64 {
        self.discrepancies_total.load(Ordering::Relaxed)
    }

    /// Swap the per-interval counters and return a summary
    pub fn report(&self) -> MetricsSummary {
        let events = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let secs = elapsed.as_secs_f64();

        MetricsSummary {
            events_per_sec: if secs > 0.0 { events as f64 / secs } else { 0.0 },
            avg_latency_us: if events > 0 { latency_sum / events } else { 0 },
            max_latency_us: latency_max,
            p99_latency_us: percentile_from_buckets(&buckets, 0.99),
            weight_samples_total: self.weight_samples_total.load(Ordering::Relaxed),
            weight_added_total: self.weight_added_total.load(Ordering::Relaxed),
            weight_removed_total: self.weight_removed_total.load(Ordering::Relaxed),
            weight_faults_total: self.weight_faults_total.load(Ordering::Relaxed),
            scans_total: self.scans_total.load(Ordering::Relaxed),
            scans_unknown_total: self.scans_unknown_total.load(Ordering::Relaxed),
            scanner_faults_total: self.scanner_faults_total.load(Ordering::Relaxed),
            items_added_total: self.items_added_total.load(Ordering::Relaxed),
            reconciliations_total: self.reconciliations_total.load(Ordering::Relaxed),
            discrepancies_total: self.discrepancies_total.load(Ordering::Relaxed),
            events_dropped_total: self.events_dropped_total.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot produced by [`Metrics::report`]
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub p99_latency_us: u64,
    pub weight_samples_total: u64,
    pub weight_added_total: u64,
    pub weight_removed_total: u64,
    pub weight_faults_total: u64,
    pub scans_total: u64,
    pub scans_unknown_total: u64,
    pub scanner_faults_total: u64,
    pub items_added_total: u64,
    pub reconciliations_total: u64,
    pub discrepancies_total: u64,
    pub events_dropped_total: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.p99_latency_us,
            weight_samples = %self.weight_samples_total,
            weight_added = %self.weight_added_total,
            weight_removed = %self.weight_removed_total,
            weight_faults = %self.weight_faults_total,
            scans = %self.scans_total,
            scans_unknown = %self.scans_unknown_total,
            scanner_faults = %self.scanner_faults_total,
            discrepancies = %self.discrepancies_total,
            dropped = %self.events_dropped_total,
            "metrics"
        );
    }
}
