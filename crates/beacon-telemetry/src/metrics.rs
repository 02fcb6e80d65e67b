//! Prometheus metrics for the tracking pipeline.
//!
//! All metrics follow the naming convention: `beacon_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., events_recorded_total)
//! - **Gauge**: Value that can go up or down (e.g., event_queue_depth)
//! - **Histogram**: Distribution of values (e.g., flush_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // INGESTION METRICS
    // =========================================================================

    /// Events accepted by the ingestion worker
    pub static ref EVENTS_RECORDED: Counter = Counter::new(
        "beacon_ingestion_events_recorded_total",
        "Total number of events appended to the event queue"
    ).expect("metric creation failed");

    /// Calls rejected by input validation
    pub static ref EVENTS_REJECTED: Counter = Counter::new(
        "beacon_ingestion_events_rejected_total",
        "Total number of tracking calls rejected by validation"
    ).expect("metric creation failed");

    /// Current event queue depth
    pub static ref EVENT_QUEUE_DEPTH: Gauge = Gauge::new(
        "beacon_ingestion_event_queue_depth",
        "Number of events waiting for the next flush"
    ).expect("metric creation failed");

    /// Target parameter history wipes caused by identity changes or logout
    pub static ref TARGET_HISTORY_CLEARS: Counter = Counter::new(
        "beacon_ingestion_target_history_clears_total",
        "Total number of target parameter history clears"
    ).expect("metric creation failed");

    // =========================================================================
    // FLUSH METRICS
    // =========================================================================

    /// Flushed batches by outcome
    pub static ref FLUSH_BATCHES: CounterVec = CounterVec::new(
        Opts::new("beacon_flush_batches_total", "Flushed batches by outcome"),
        &["outcome"]  // outcome: sent/failed/timeout
    ).expect("metric creation failed");

    /// Events lost because their batch failed to deliver
    pub static ref EVENTS_DROPPED: Counter = Counter::new(
        "beacon_flush_events_dropped_total",
        "Total number of events dropped by failed flushes"
    ).expect("metric creation failed");

    /// Flush duration
    pub static ref FLUSH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "beacon_flush_duration_seconds",
            "Time spent delivering one batch"
        ).buckets(exponential_buckets(0.001, 2.0, 15).unwrap_or_default())
    ).expect("metric creation failed");

    // =========================================================================
    // TARGETING METRICS
    // =========================================================================

    /// Targeting lookups by kind and outcome
    pub static ref TARGETING_CHECKS: CounterVec = CounterVec::new(
        Opts::new("beacon_targeting_checks_total", "Targeting lookups by kind and outcome"),
        &["kind", "outcome"]  // kind: notification/action/recommendation/favorites/subscription, outcome: presented/empty/sent/failed
    ).expect("metric creation failed");

    // =========================================================================
    // PERSISTENCE METRICS
    // =========================================================================

    /// Persistence failures by operation
    pub static ref PERSISTENCE_ERRORS: CounterVec = CounterVec::new(
        Opts::new("beacon_persistence_errors_total", "Persistence failures by operation"),
        &["operation"]
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Ingestion
        Box::new(EVENTS_RECORDED.clone()),
        Box::new(EVENTS_REJECTED.clone()),
        Box::new(EVENT_QUEUE_DEPTH.clone()),
        Box::new(TARGET_HISTORY_CLEARS.clone()),
        // Flush
        Box::new(FLUSH_BATCHES.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(FLUSH_DURATION.clone()),
        // Targeting
        Box::new(TARGETING_CHECKS.clone()),
        // Persistence
        Box::new(PERSISTENCE_ERRORS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
