//! # Beacon Telemetry
//!
//! Observability layer shared by the tracking pipeline and the runtime binary.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter, pretty or JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms in a global registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Pipeline code runs here; logs and metrics are collected.
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `beacon` | Service name attached to the startup log |
//! | `BEACON_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `BEACON_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `BEACON_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, EVENTS_DROPPED, EVENTS_RECORDED,
    EVENTS_REJECTED, EVENT_QUEUE_DEPTH, FLUSH_BATCHES, FLUSH_DURATION, PERSISTENCE_ERRORS,
    TARGETING_CHECKS, TARGET_HISTORY_CLEARS,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so that the startup log already counts
    let metrics_handle = register_metrics()?;

    init_tracing(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with subsystem context.
///
/// # Example
///
/// ```rust,ignore
/// use beacon_telemetry::subsystem_span;
///
/// let span = subsystem_span!("flush_batch", subsystem = "flush", events = 12);
/// deliver(batch).instrument(span).await;
/// ```
#[macro_export]
macro_rules! subsystem_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
