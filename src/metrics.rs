//! Prometheus metrics for monitoring cakerank.
//!
//! Covers the popularity cache (lookups, recomputations, invalidations,
//! snapshot state) and the HTTP surface.

use crate::popularity::RankedSnapshot;
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;
use tracing::error;

/// All metrics for the cakerank service
pub struct Metrics {
    pub registry: Registry,

    // Cache metrics
    pub cache_lookups_total: CounterVec,
    pub cache_snapshot_entries: Gauge,
    pub cache_snapshot_present: Gauge,
    pub cache_snapshot_build_duration_seconds: Gauge,
    pub cache_snapshot_age_seconds: Gauge,
    pub cache_invalidations_total: CounterVec,

    // Recomputation metrics
    pub recompute_total: CounterVec,
    pub recompute_duration_seconds: HistogramVec,

    // Request metrics
    pub requests_total: CounterVec,
    pub request_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new metrics registry with all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cache metrics
        let cache_lookups_total = CounterVec::new(
            Opts::new(
                "cakerank_cache_lookups_total",
                "Popularity cache lookups by outcome (hit, miss, coalesced)",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let cache_snapshot_entries = Gauge::with_opts(Opts::new(
            "cakerank_cache_snapshot_entries",
            "Number of ranked products in the current snapshot",
        ))?;
        registry.register(Box::new(cache_snapshot_entries.clone()))?;

        let cache_snapshot_present = Gauge::with_opts(Opts::new(
            "cakerank_cache_snapshot_present",
            "Whether a snapshot is currently held (0 or 1)",
        ))?;
        registry.register(Box::new(cache_snapshot_present.clone()))?;

        let cache_snapshot_build_duration_seconds = Gauge::with_opts(Opts::new(
            "cakerank_cache_snapshot_build_duration_seconds",
            "How long the current snapshot took to build",
        ))?;
        registry.register(Box::new(cache_snapshot_build_duration_seconds.clone()))?;

        let cache_snapshot_age_seconds = Gauge::with_opts(Opts::new(
            "cakerank_cache_snapshot_age_seconds",
            "Age of the current snapshot at the last scrape",
        ))?;
        registry.register(Box::new(cache_snapshot_age_seconds.clone()))?;

        let cache_invalidations_total = CounterVec::new(
            Opts::new(
                "cakerank_cache_invalidations_total",
                "Cache invalidations by triggering write event",
            ),
            &["event"],
        )?;
        registry.register(Box::new(cache_invalidations_total.clone()))?;

        // Recomputation metrics
        let recompute_total = CounterVec::new(
            Opts::new(
                "cakerank_recompute_total",
                "Popularity recomputations by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(recompute_total.clone()))?;

        let recompute_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cakerank_recompute_duration_seconds",
                "Popularity recomputation duration",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["status"],
        )?;
        registry.register(Box::new(recompute_duration_seconds.clone()))?;

        // Request metrics
        let requests_total = CounterVec::new(
            Opts::new("cakerank_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cakerank_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
            &["route"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            cache_lookups_total,
            cache_snapshot_entries,
            cache_snapshot_present,
            cache_snapshot_build_duration_seconds,
            cache_snapshot_age_seconds,
            cache_invalidations_total,
            recompute_total,
            recompute_duration_seconds,
            requests_total,
            request_duration_seconds,
        })
    }

    /// Record a cache lookup outcome
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.cache_lookups_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a finished recomputation
    pub fn record_recompute(&self, status: &str, duration_secs: f64) {
        self.recompute_total.with_label_values(&[status]).inc();
        self.recompute_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    pub fn record_invalidation(&self, event: &str) {
        self.cache_invalidations_total
            .with_label_values(&[event])
            .inc();
    }

    /// Record an HTTP request
    pub fn record_request(&self, route: &str, status: u16, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[route])
            .observe(duration_secs);
    }

    /// Update snapshot gauges; `None` after an invalidation
    pub fn update_snapshot_metrics(&self, snapshot: Option<&RankedSnapshot>) {
        match snapshot {
            Some(snapshot) => {
                self.cache_snapshot_present.set(1.0);
                self.cache_snapshot_entries
                    .set(snapshot.entries.len() as f64);
                self.cache_snapshot_build_duration_seconds
                    .set(snapshot.build_duration.as_secs_f64());
            }
            None => {
                self.cache_snapshot_present.set(0.0);
                self.cache_snapshot_entries.set(0.0);
                self.cache_snapshot_age_seconds.set(0.0);
            }
        }
    }

    pub fn set_snapshot_age(&self, age_secs: f64) {
        self.cache_snapshot_age_seconds.set(age_secs);
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                String::new()
            }
        }
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<Metrics>;

/// Create a shared metrics instance
pub fn create_metrics() -> SharedMetrics {
    Arc::new(Metrics::new().expect("Failed to create metrics"))
}
