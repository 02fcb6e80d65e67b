//! Network sender adapters

use crate::domain::SessionCookie;
use crate::error::NetworkError;
use crate::ports::outbound::NetworkSender;
use crate::state::FlushBatch;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cookie entry the bundled senders use to number delivered batches
pub const BATCH_SEQUENCE_COOKIE: &str = "batch_seq";

/// Logs each batch instead of delivering it.
///
/// Used by the runtime binary where no collector is configured.
#[derive(Default)]
pub struct LoggingNetworkSender {
    sequence: AtomicU64,
}

impl LoggingNetworkSender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NetworkSender for LoggingNetworkSender {
    async fn send(
        &self,
        batch: FlushBatch,
        _timeout: Duration,
    ) -> Result<SessionCookie, NetworkError> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        for record in &batch.events {
            let line = serde_json::to_string(record).map_err(|e| NetworkError::InvalidResponse {
                reason: e.to_string(),
            })?;
            tracing::info!(subsystem = "flush", batch = seq, record = %line, "Event delivered");
        }
        let mut cookie = batch.cookie;
        cookie.set(BATCH_SEQUENCE_COOKIE, seq.to_string());
        Ok(cookie)
    }
}

/// How `MockNetworkSender` answers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockSendBehavior {
    /// Accept and bump the batch sequence in the cookie
    Accept,
    /// Fail immediately with the given error
    Fail(NetworkError),
    /// Never answer; the caller's timeout fires
    Hang,
}

/// Records every batch it is handed.
pub struct MockNetworkSender {
    behavior: RwLock<MockSendBehavior>,
    batches: RwLock<Vec<FlushBatch>>,
}

impl Default for MockNetworkSender {
    fn default() -> Self {
        Self::new(MockSendBehavior::Accept)
    }
}

impl MockNetworkSender {
    pub fn new(behavior: MockSendBehavior) -> Self {
        Self {
            behavior: RwLock::new(behavior),
            batches: RwLock::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: MockSendBehavior) {
        *self.behavior.write() = behavior;
    }

    /// Every batch handed to `send`, accepted or not.
    pub fn batches(&self) -> Vec<FlushBatch> {
        self.batches.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.batches.read().len()
    }
}

#[async_trait]
impl NetworkSender for MockNetworkSender {
    async fn send(
        &self,
        batch: FlushBatch,
        _timeout: Duration,
    ) -> Result<SessionCookie, NetworkError> {
        let behavior = self.behavior.read().clone();
        let mut cookie = batch.cookie.clone();
        let seq = {
            let mut batches = self.batches.write();
            batches.push(batch);
            batches.len()
        };

        match behavior {
            MockSendBehavior::Accept => {
                cookie.set(BATCH_SEQUENCE_COOKIE, seq.to_string());
                Ok(cookie)
            }
            MockSendBehavior::Fail(e) => Err(e),
            MockSendBehavior::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventRecord, UserState};

    fn batch() -> FlushBatch {
        FlushBatch {
            events: vec![EventRecord::new()],
            user: UserState::default(),
            cookie: SessionCookie::new(),
        }
    }

    #[tokio::test]
    async fn test_logging_sender_numbers_batches() {
        let sender = LoggingNetworkSender::new();
        let first = sender.send(batch(), Duration::from_secs(1)).await.unwrap();
        let second = sender.send(batch(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.get(BATCH_SEQUENCE_COOKIE), Some("1"));
        assert_eq!(second.get(BATCH_SEQUENCE_COOKIE), Some("2"));
    }

    #[tokio::test]
    async fn test_mock_sender_records_failed_batches() {
        let sender = MockNetworkSender::new(MockSendBehavior::Fail(NetworkError::Rejected {
            status: 503,
        }));
        let result = sender.send(batch(), Duration::from_secs(1)).await;
        assert_eq!(result, Err(NetworkError::Rejected { status: 503 }));
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_sender_hangs_until_timeout() {
        let sender = MockNetworkSender::new(MockSendBehavior::Hang);
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            sender.send(batch(), Duration::from_secs(5)),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(sender.call_count(), 1);
    }
}
