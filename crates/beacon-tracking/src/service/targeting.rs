//! Targeting worker
//!
//! Runs the notification and targeting-action checks for a page view
//! concurrently. Either may fail without affecting the other. Favorite
//! attribute lookups and subscription submits share this queue, so they are
//! ordered after the page views enqueued before them.

use super::storage::UserRecordWriter;
use crate::domain::{
    EventRecord, FavoriteAttributeResponse, InAppNotification, PresentationModel, Properties,
    UserState,
};
use crate::error::NetworkError;
use crate::ports::outbound::{Presentation, TargetingService};
use crate::state::StateStore;
use beacon_telemetry::{log_event, metric_inc, TARGETING_CHECKS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{error::Elapsed, timeout};

const SUBSYSTEM: &str = "targeting";

pub(crate) enum TargetingCommand {
    Check {
        properties: EventRecord,
        user: UserState,
    },
    Favorites {
        action_id: Option<u64>,
        user: UserState,
        reply: oneshot::Sender<FavoriteAttributeResponse>,
    },
    Subscribe {
        properties: Properties,
    },
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct TargetingWorker {
    pub(crate) state: Arc<StateStore>,
    pub(crate) user_writer: UserRecordWriter,
    pub(crate) targeting: Arc<dyn TargetingService>,
    pub(crate) presentation: Arc<dyn Presentation>,
    pub(crate) timeout: Duration,
}

impl TargetingWorker {
    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<TargetingCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                TargetingCommand::Check { properties, user } => self.check(properties, user).await,
                TargetingCommand::Favorites {
                    action_id,
                    user,
                    reply,
                } => {
                    let response = self.favorites(action_id, &user).await;
                    if reply.send(response).is_err() {
                        log_event!(debug, SUBSYSTEM, "Caller went away before the favorites");
                    }
                }
                TargetingCommand::Subscribe { properties } => self.subscribe(&properties).await,
                TargetingCommand::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
        log_event!(debug, SUBSYSTEM, "Targeting worker stopped");
    }

    async fn check(&self, properties: EventRecord, user: UserState) {
        let (notification, action) = tokio::join!(
            timeout(
                self.timeout,
                self.targeting.check_notification(&properties, &user)
            ),
            timeout(
                self.timeout,
                self.targeting.check_targeting_action(&properties, &user)
            ),
        );

        if let Some(notification) = self.settle("notification", notification) {
            self.show_notification(notification).await;
        }
        if let Some(action) = self.settle("action", action) {
            self.presentation
                .present(PresentationModel::TargetingAction(action));
        }
    }

    fn timed_out(&self) -> NetworkError {
        NetworkError::Timeout {
            after_secs: self.timeout.as_secs(),
        }
    }

    fn settle<T>(
        &self,
        kind: &'static str,
        outcome: Result<Result<Option<T>, NetworkError>, Elapsed>,
    ) -> Option<T> {
        match outcome.unwrap_or_else(|_| Err(self.timed_out())) {
            Ok(Some(model)) => {
                metric_inc!(TARGETING_CHECKS, &[kind, "presented"]);
                Some(model)
            }
            Ok(None) => {
                metric_inc!(TARGETING_CHECKS, &[kind, "empty"]);
                None
            }
            Err(e) => {
                metric_inc!(TARGETING_CHECKS, &[kind, "failed"]);
                log_event!(warn, SUBSYSTEM, "Targeting check failed", kind = kind, error = %e);
                None
            }
        }
    }

    async fn show_notification(&self, notification: InAppNotification) {
        self.state.with_write(|s| {
            s.user.visit_data = notification.visit_data.clone();
            s.user.visitor_data = notification.visitor_data.clone();
        });
        self.user_writer.save(SUBSYSTEM).await;
        self.presentation
            .present(PresentationModel::Notification(notification));
    }

    async fn favorites(&self, action_id: Option<u64>, user: &UserState) -> FavoriteAttributeResponse {
        let outcome = timeout(
            self.timeout,
            self.targeting.favorite_attributes(action_id, user),
        )
        .await
        .unwrap_or_else(|_| Err(self.timed_out()));

        match outcome {
            Ok(favorites) => {
                let label = if favorites.is_empty() { "empty" } else { "presented" };
                metric_inc!(TARGETING_CHECKS, &["favorites", label]);
                FavoriteAttributeResponse {
                    favorites,
                    error: None,
                }
            }
            Err(e) => {
                metric_inc!(TARGETING_CHECKS, &["favorites", "failed"]);
                log_event!(warn, SUBSYSTEM, "Favorite attribute lookup failed", error = %e);
                FavoriteAttributeResponse::failed(e.to_string())
            }
        }
    }

    async fn subscribe(&self, properties: &Properties) {
        let outcome = timeout(self.timeout, self.targeting.subscribe(properties))
            .await
            .unwrap_or_else(|_| Err(self.timed_out()));

        match outcome {
            Ok(()) => {
                metric_inc!(TARGETING_CHECKS, &["subscription", "sent"]);
            }
            Err(e) => {
                metric_inc!(TARGETING_CHECKS, &["subscription", "failed"]);
                log_event!(warn, SUBSYSTEM, "Subscription submit failed", error = %e);
            }
        }
    }
}
