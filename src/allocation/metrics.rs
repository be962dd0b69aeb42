// Performance Metrics for the allocation engine
//
// Tracks execution times of snapshot loads, combination searches and
// pricing runs, directory cache hit rates and unfulfilled quotes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Performance threshold for slow operations (100ms)
const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Counters for one kind of timed operation
#[derive(Debug, Default)]
struct OperationStats {
    count: AtomicU64,
    total_time_us: AtomicU64,
    slow: AtomicU64,
}

impl OperationStats {
    fn record(&self, label: &str, duration: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS {
            self.slow.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow {}: {}ms", label, duration.as_millis());
        }
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn slow(&self) -> u64 {
        self.slow.load(Ordering::Relaxed)
    }

    fn avg_time_ms(&self) -> f64 {
        let count = self.count();
        let total_us = self.total_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }
}

/// Performance metrics for the allocation engine
///
/// Cheap to clone; all clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    unavailable_quotes: AtomicU64,
    snapshot_loads: OperationStats,
    normal_searches: OperationStats,
    segmented_searches: OperationStats,
    pricing_runs: OperationStats,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quote that ended as "not available"
    pub fn record_unavailable_quote(&self) {
        self.inner.unavailable_quotes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache hit rate (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn start_snapshot_load(&self) -> OperationTimer {
        OperationTimer::new(OperationType::SnapshotLoad, self.clone())
    }

    pub fn start_normal_search(&self) -> OperationTimer {
        OperationTimer::new(OperationType::NormalSearch, self.clone())
    }

    pub fn start_segmented_search(&self) -> OperationTimer {
        OperationTimer::new(OperationType::SegmentedSearch, self.clone())
    }

    pub fn start_pricing(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Pricing, self.clone())
    }

    fn stats(&self, operation_type: OperationType) -> &OperationStats {
        match operation_type {
            OperationType::SnapshotLoad => &self.inner.snapshot_loads,
            OperationType::NormalSearch => &self.inner.normal_searches,
            OperationType::SegmentedSearch => &self.inner.segmented_searches,
            OperationType::Pricing => &self.inner.pricing_runs,
        }
    }

    fn record(&self, operation_type: OperationType, duration: Duration) {
        self.stats(operation_type)
            .record(operation_type.label(), duration);
    }

    pub fn summary(&self) -> MetricsSummary {
        let inner = &self.inner;
        MetricsSummary {
            cache_hit_rate: self.cache_hit_rate(),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: inner.cache_misses.load(Ordering::Relaxed),
            unavailable_quotes: inner.unavailable_quotes.load(Ordering::Relaxed),
            snapshot_loads: inner.snapshot_loads.count(),
            avg_snapshot_load_ms: inner.snapshot_loads.avg_time_ms(),
            slow_snapshot_loads: inner.snapshot_loads.slow(),
            normal_searches: inner.normal_searches.count(),
            avg_normal_search_ms: inner.normal_searches.avg_time_ms(),
            slow_normal_searches: inner.normal_searches.slow(),
            segmented_searches: inner.segmented_searches.count(),
            avg_segmented_search_ms: inner.segmented_searches.avg_time_ms(),
            slow_segmented_searches: inner.segmented_searches.slow(),
            pricing_runs: inner.pricing_runs.count(),
            avg_pricing_ms: inner.pricing_runs.avg_time_ms(),
            slow_pricing_runs: inner.pricing_runs.slow(),
        }
    }

    /// Log the counters at info level, e.g. on shutdown
    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Allocation Performance Metrics:\n\
             Directory cache: {:.1}% hit rate ({} hits, {} misses)\n\
             Snapshot loads: {}, avg {:.2}ms, {} slow\n\
             Normal searches: {}, avg {:.2}ms, {} slow\n\
             Segmented searches: {}, avg {:.2}ms, {} slow\n\
             Pricing runs: {}, avg {:.2}ms, {} slow\n\
             Not available: {}",
            summary.cache_hit_rate * 100.0,
            summary.cache_hits,
            summary.cache_misses,
            summary.snapshot_loads,
            summary.avg_snapshot_load_ms,
            summary.slow_snapshot_loads,
            summary.normal_searches,
            summary.avg_normal_search_ms,
            summary.slow_normal_searches,
            summary.segmented_searches,
            summary.avg_segmented_search_ms,
            summary.slow_segmented_searches,
            summary.pricing_runs,
            summary.avg_pricing_ms,
            summary.slow_pricing_runs,
            summary.unavailable_quotes,
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum OperationType {
    SnapshotLoad,
    NormalSearch,
    SegmentedSearch,
    Pricing,
}

impl OperationType {
    fn label(&self) -> &'static str {
        match self {
            OperationType::SnapshotLoad => "snapshot load",
            OperationType::NormalSearch => "normal combination search",
            OperationType::SegmentedSearch => "segmented combination search",
            OperationType::Pricing => "pricing run",
        }
    }
}

/// Timer recording an operation's duration when dropped
pub struct OperationTimer {
    start: Instant,
    operation_type: OperationType,
    metrics: PerformanceMetrics,
}

impl OperationTimer {
    fn new(operation_type: OperationType, metrics: PerformanceMetrics) -> Self {
        Self {
            start: Instant::now(),
            operation_type,
            metrics,
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics
            .record(self.operation_type, self.start.elapsed());
    }
}

/// Summary of performance metrics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSummary {
    pub cache_hit_rate: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub unavailable_quotes: u64,
    pub snapshot_loads: u64,
    pub avg_snapshot_load_ms: f64,
    pub slow_snapshot_loads: u64,
    pub normal_searches: u64,
    pub avg_normal_search_ms: f64,
    pub slow_normal_searches: u64,
    pub segmented_searches: u64,
    pub avg_segmented_search_ms: f64,
    pub slow_segmented_searches: u64,
    pub pricing_runs: u64,
    pub avg_pricing_ms: f64,
    pub slow_pricing_runs: u64,
}
