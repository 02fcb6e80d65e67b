//! Worker-side persistence
//!
//! `PersistenceGateway` is synchronous, so workers never call it on an async
//! task directly: every call is offloaded to tokio's blocking pool and awaited.
//! This keeps a slow disk from stalling the other workers, even on a
//! current-thread runtime.
//!
//! The user record is saved by both the ingestion and the targeting worker.
//! `UserRecordWriter` serializes those saves and re-reads the published user
//! under the same lock, so whichever save lands last carries the newest state.

use crate::error::PersistenceError;
use crate::ports::outbound::PersistenceGateway;
use crate::state::StateStore;
use beacon_telemetry::{log_event, metric_inc, PERSISTENCE_ERRORS};
use parking_lot::Mutex;
use std::sync::Arc;

/// Log and count a persistence failure. In-memory state stays authoritative.
pub(crate) fn persist<T>(
    subsystem: &'static str,
    operation: &'static str,
    result: Result<T, PersistenceError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            metric_inc!(PERSISTENCE_ERRORS, &[operation]);
            log_event!(
                error,
                subsystem,
                "Persistence operation failed",
                operation = operation,
                error = %e
            );
            None
        }
    }
}

/// Run a gateway call on the blocking pool, then absorb its failure like
/// `persist`.
pub(crate) async fn persist_blocking<T, F>(
    subsystem: &'static str,
    operation: &'static str,
    call: F,
) -> Option<T>
where
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(call)
        .await
        .unwrap_or_else(|e| {
            Err(PersistenceError::Io {
                reason: format!("persistence task failed: {e}"),
            })
        });
    persist(subsystem, operation, result)
}

/// Saves the user record as currently published in the `StateStore`.
#[derive(Clone)]
pub(crate) struct UserRecordWriter {
    state: Arc<StateStore>,
    persistence: Arc<dyn PersistenceGateway>,
    order: Arc<Mutex<()>>,
}

impl UserRecordWriter {
    pub(crate) fn new(state: Arc<StateStore>, persistence: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            state,
            persistence,
            order: Arc::new(Mutex::new(())),
        }
    }

    /// Persist the latest published user. Returns `false` if the save failed.
    ///
    /// The snapshot is taken only once the previous save has finished.
    pub(crate) async fn save(&self, subsystem: &'static str) -> bool {
        let writer = self.clone();
        persist_blocking(subsystem, "save_user", move || {
            let _order = writer.order.lock();
            let user = writer.state.user();
            writer.persistence.save_user(&user)
        })
        .await
        .is_some()
    }
}
