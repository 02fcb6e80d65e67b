//! Structured logging helpers.
//!
//! Every log line emitted through these macros carries a `subsystem` field
//! naming the worker that produced it (`ingestion`, `flush`, `targeting`,
//! `recommendation`, `persistence`), so JSON output can be filtered per queue.

/// Emit a structured log entry with a subsystem field.
///
/// ```rust,ignore
/// beacon_telemetry::log_event!(warn, "flush", "Batch dropped", events = 3);
/// ```
#[macro_export]
macro_rules! log_event {
    (info, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };

    (error, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };
}
