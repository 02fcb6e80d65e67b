//! Flush worker
//!
//! Delivery is at-most-once: the queue is swapped out before the send, and a
//! batch whose send fails or times out is dropped, never re-queued. Batches
//! are sent one at a time so cookie updates cannot race.

use crate::error::NetworkError;
use crate::ports::outbound::NetworkSender;
use crate::state::StateStore;
use beacon_telemetry::{
    log_event, metric_inc, subsystem_span, time_histogram, EVENTS_DROPPED, EVENT_QUEUE_DEPTH,
    FLUSH_BATCHES, FLUSH_DURATION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

const SUBSYSTEM: &str = "flush";

pub(crate) enum FlushCommand {
    Flush,
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct FlushWorker {
    pub(crate) state: Arc<StateStore>,
    pub(crate) network: Arc<dyn NetworkSender>,
    pub(crate) timeout: Duration,
}

impl FlushWorker {
    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<FlushCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                FlushCommand::Flush => self.flush().await,
                FlushCommand::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
        log_event!(debug, SUBSYSTEM, "Flush worker stopped");
    }

    async fn flush(&self) {
        let batch = self.state.take_batch();
        EVENT_QUEUE_DEPTH.set(self.state.with_read(|s| s.events.len()) as f64);

        let size = batch.events.len();
        if size == 0 {
            return;
        }

        let span = subsystem_span!("flush_batch", subsystem = SUBSYSTEM, events = size);
        let _timer = time_histogram!(FLUSH_DURATION);
        let outcome = tokio::time::timeout(self.timeout, self.network.send(batch, self.timeout))
            .instrument(span)
            .await
            .unwrap_or(Err(NetworkError::Timeout {
                after_secs: self.timeout.as_secs(),
            }));

        match outcome {
            Ok(cookie) => {
                self.state.with_write(|s| s.cookie = cookie);
                metric_inc!(FLUSH_BATCHES, &["sent"]);
                log_event!(debug, SUBSYSTEM, "Batch delivered", events = size);
            }
            Err(e) => {
                let label = match e {
                    NetworkError::Timeout { .. } => "timeout",
                    _ => "failed",
                };
                metric_inc!(FLUSH_BATCHES, &[label]);
                EVENTS_DROPPED.inc_by(size as f64);
                log_event!(
                    warn,
                    SUBSYSTEM,
                    "Batch dropped",
                    events = size,
                    error = %e
                );
            }
        }
    }
}
