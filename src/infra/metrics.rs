//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! `report()` swaps the periodic counters to zero to take a snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; window coordination lives in `WindowGuard`.

use crate::domain::types::Modality;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Pipeline latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

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

#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Readings accepted into the store, indexed like `Modality::ALL` (monotonic)
    readings_received: [AtomicU64; 4],
    /// Readings received since last report (reset on report)
    readings_since_report: AtomicU64,
    /// Payloads rejected as malformed or of unknown modality (monotonic)
    readings_malformed: AtomicU64,
    /// Readings dropped because the ingest channel was full (monotonic)
    readings_dropped: AtomicU64,
    windows_opened: AtomicU64,
    windows_closed: AtomicU64,
    pipeline_runs: AtomicU64,
    pipeline_failures: AtomicU64,
    records_fused: AtomicU64,
    detections_published: AtomicU64,
    classifier_failures: AtomicU64,
    label_mismatches: AtomicU64,
    /// Pipeline latency histogram (reset on report)
    pipeline_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    pipeline_latency_max_us: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

fn modality_index(modality: Modality) -> usize {
    match modality {
        Modality::Camera => 0,
        Modality::Presence => 1,
        Modality::Rfid => 2,
        Modality::Wifi => 3,
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            readings_received: std::array::from_fn(|_| AtomicU64::new(0)),
            readings_since_report: AtomicU64::new(0),
            readings_malformed: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
            windows_opened: AtomicU64::new(0),
            windows_closed: AtomicU64::new(0),
            pipeline_runs: AtomicU64::new(0),
            pipeline_failures: AtomicU64::new(0),
            records_fused: AtomicU64::new(0),
            detections_published: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            label_mismatches: AtomicU64::new(0),
            pipeline_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            pipeline_latency_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_reading(&self, modality: Modality) {
        self.readings_received[modality_index(modality)].fetch_add(1, Ordering::Relaxed);
        self.readings_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed(&self) {
        self.readings_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_window_opened(&self) {
        self.windows_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_window_closed(&self) {
        self.windows_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed pipeline run and its latency
    pub fn record_pipeline_run(&self, latency_us: u64, records: usize, detections: usize) {
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        self.records_fused.fetch_add(records as u64, Ordering::Relaxed);
        self.detections_published.fetch_add(detections as u64, Ordering::Relaxed);
        self.pipeline_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.pipeline_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_pipeline_failure(&self) {
        self.pipeline_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_classifier_failure(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_label_mismatch(&self) {
        self.label_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn readings_received(&self, modality: Modality) -> u64 {
        self.readings_received[modality_index(modality)].load(Ordering::Relaxed)
    }

    pub fn readings_malformed(&self) -> u64 {
        self.readings_malformed.load(Ordering::Relaxed)
    }

    pub fn readings_dropped(&self) -> u64 {
        self.readings_dropped.load(Ordering::Relaxed)
    }

    pub fn windows_opened(&self) -> u64 {
        self.windows_opened.load(Ordering::Relaxed)
    }

    pub fn windows_closed(&self) -> u64 {
        self.windows_closed.load(Ordering::Relaxed)
    }

    pub fn pipeline_runs(&self) -> u64 {
        self.pipeline_runs.load(Ordering::Relaxed)
    }

    pub fn pipeline_failures(&self) -> u64 {
        self.pipeline_failures.load(Ordering::Relaxed)
    }

    pub fn records_fused(&self) -> u64 {
        self.records_fused.load(Ordering::Relaxed)
    }

    pub fn detections_published(&self) -> u64 {
        self.detections_published.load(Ordering::Relaxed)
    }

    pub fn classifier_failures(&self) -> u64 {
        self.classifier_failures.load(Ordering::Relaxed)
    }

    pub fn label_mismatches(&self) -> u64 {
        self.label_mismatches.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let readings_count = self.readings_since_report.swap(0, Ordering::Relaxed);
        let pipeline_lat_buckets = swap_buckets(&self.pipeline_latency_buckets);
        let pipeline_lat_max_us = self.pipeline_latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let readings_per_sec = if elapsed.as_secs_f64() > 0.0 {
            readings_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            readings_per_sec,
            readings_camera: self.readings_received(Modality::Camera),
            readings_presence: self.readings_received(Modality::Presence),
            readings_rfid: self.readings_received(Modality::Rfid),
            readings_wifi: self.readings_received(Modality::Wifi),
            readings_malformed: self.readings_malformed(),
            readings_dropped: self.readings_dropped(),
            windows_opened: self.windows_opened(),
            windows_closed: self.windows_closed(),
            pipeline_runs: self.pipeline_runs(),
            pipeline_failures: self.pipeline_failures(),
            records_fused: self.records_fused(),
            detections_published: self.detections_published(),
            classifier_failures: self.classifier_failures(),
            label_mismatches: self.label_mismatches(),
            pipeline_lat_buckets,
            pipeline_lat_max_us,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub readings_per_sec: f64,
    pub readings_camera: u64,
    pub readings_presence: u64,
    pub readings_rfid: u64,
    pub readings_wifi: u64,
    pub readings_malformed: u64,
    pub readings_dropped: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub pipeline_runs: u64,
    pub pipeline_failures: u64,
    pub records_fused: u64,
    pub detections_published: u64,
    pub classifier_failures: u64,
    pub label_mismatches: u64,
    /// Pipeline latency histogram since the last report
    pub pipeline_lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub pipeline_lat_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            readings_per_sec = format!("{:.1}", self.readings_per_sec),
            camera = %self.readings_camera,
            presence = %self.readings_presence,
            rfid = %self.readings_rfid,
            wifi = %self.readings_wifi,
            malformed = %self.readings_malformed,
            dropped = %self.readings_dropped,
            windows = %self.windows_closed,
            pipeline_failures = %self.pipeline_failures,
            records = %self.records_fused,
            detections = %self.detections_published,
            pipeline_max_us = %self.pipeline_lat_max_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.readings_received(Modality::Camera), 0);
        assert_eq!(metrics.windows_opened(), 0);
    }

    #[test]
    fn test_record_reading_per_modality() {
        let metrics = Metrics::new();
        metrics.record_reading(Modality::Rfid);
        metrics.record_reading(Modality::Rfid);
        metrics.record_reading(Modality::Wifi);
        assert_eq!(metrics.readings_received(Modality::Rfid), 2);
        assert_eq!(metrics.readings_received(Modality::Wifi), 1);
        assert_eq!(metrics.readings_received(Modality::Camera), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(100_000), 10);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_pipeline_run(150, 3, 1);
        metrics.record_pipeline_run(90, 2, 0);

        let summary = metrics.report();
        assert_eq!(summary.pipeline_runs, 2);
        assert_eq!(summary.records_fused, 5);
        assert_eq!(summary.detections_published, 1);
        assert_eq!(summary.pipeline_lat_buckets[0], 1);
        assert_eq!(summary.pipeline_lat_buckets[1], 1);
        assert_eq!(summary.pipeline_lat_max_us, 150);

        let summary = metrics.report();
        assert_eq!(summary.pipeline_runs, 2, "monotonic counters survive report");
        assert_eq!(summary.pipeline_lat_max_us, 0);
        assert_eq!(summary.pipeline_lat_buckets.iter().sum::<u64>(), 0);
    }
}
