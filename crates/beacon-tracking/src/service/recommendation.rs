//! Recommendation worker

use crate::domain::{RecommendationRequest, RecommendationResponse};
use crate::error::NetworkError;
use crate::ports::outbound::RecommendationService;
use crate::state::StateStore;
use beacon_telemetry::{log_event, metric_inc, TARGETING_CHECKS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const SUBSYSTEM: &str = "recommendation";

pub(crate) struct RecommendCommand {
    pub(crate) request: RecommendationRequest,
    pub(crate) reply: oneshot::Sender<RecommendationResponse>,
}

pub(crate) struct RecommendationWorker {
    pub(crate) state: Arc<StateStore>,
    pub(crate) service: Arc<dyn RecommendationService>,
    pub(crate) timeout: Duration,
}

impl RecommendationWorker {
    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<RecommendCommand>) {
        while let Some(RecommendCommand { request, reply }) = rx.recv().await {
            let response = self.recommend(&request).await;
            if reply.send(response).is_err() {
                log_event!(debug, SUBSYSTEM, "Caller went away before the response");
            }
        }
        log_event!(debug, SUBSYSTEM, "Recommendation worker stopped");
    }

    async fn recommend(&self, request: &RecommendationRequest) -> RecommendationResponse {
        let (user, channel) = self.state.with_read(|s| (s.user.clone(), s.channel.clone()));

        let outcome = tokio::time::timeout(
            self.timeout,
            self.service.recommend(request, &user, &channel),
        )
        .await
        .unwrap_or(Err(NetworkError::Timeout {
            after_secs: self.timeout.as_secs(),
        }));

        match outcome {
            Ok(products) => {
                let label = if products.is_empty() { "empty" } else { "presented" };
                metric_inc!(TARGETING_CHECKS, &["recommendation", label]);
                RecommendationResponse {
                    products,
                    error: None,
                }
            }
            Err(e) => {
                metric_inc!(TARGETING_CHECKS, &["recommendation", "failed"]);
                log_event!(
                    warn,
                    SUBSYSTEM,
                    "Recommendation lookup failed",
                    zone_id = %request.zone_id,
                    error = %e
                );
                RecommendationResponse::failed(e.to_string())
            }
        }
    }
}
