//! Ingestion worker
//!
//! The single ordered queue every state-changing call goes through. It owns
//! the read/compose/publish cycle and is the only writer of the flush and
//! targeting queues, so a flush always observes every record enqueued before
//! it, and a targeting lookup sees the identity set by earlier calls.

use super::flush::FlushCommand;
use super::storage::{persist_blocking, UserRecordWriter};
use super::targeting::TargetingCommand;
use crate::domain::{
    compose_event, format_timestamp, generate_cookie_id, Event, EventRecord,
    FavoriteAttributeResponse, ProfileConfig, SubscriptionRequest, TargetParameterCodec,
};
use crate::ports::outbound::{PersistenceGateway, TimeSource};
use crate::state::StateStore;
use beacon_telemetry::{
    log_event, metric_inc, EVENTS_RECORDED, EVENT_QUEUE_DEPTH, TARGET_HISTORY_CLEARS,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const SUBSYSTEM: &str = "ingestion";

pub(crate) enum IngestionCommand {
    Record(Event),
    Logout,
    Flush,
    Subscribe(SubscriptionRequest),
    Favorites {
        action_id: Option<u64>,
        reply: oneshot::Sender<FavoriteAttributeResponse>,
    },
    /// Forwarded downstream so `wait_idle` covers the flush and targeting queues
    Barrier {
        flush: oneshot::Sender<()>,
        targeting: oneshot::Sender<()>,
    },
}

pub(crate) struct IngestionWorker {
    pub(crate) profile: ProfileConfig,
    pub(crate) state: Arc<StateStore>,
    pub(crate) persistence: Arc<dyn PersistenceGateway>,
    pub(crate) user_writer: UserRecordWriter,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) codec: TargetParameterCodec,
    pub(crate) flush_tx: mpsc::UnboundedSender<FlushCommand>,
    pub(crate) targeting_tx: mpsc::UnboundedSender<TargetingCommand>,
}

impl IngestionWorker {
    pub(crate) async fn run(self, mut rx: mpsc::UnboundedReceiver<IngestionCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                IngestionCommand::Record(event) => self.record(event).await,
                IngestionCommand::Logout => self.logout().await,
                IngestionCommand::Flush => self.request_flush(),
                IngestionCommand::Subscribe(request) => {
                    let properties = self.state.with_read(|s| {
                        request.to_properties(&self.profile, &s.user, &s.channel)
                    });
                    self.send_targeting(TargetingCommand::Subscribe { properties });
                }
                IngestionCommand::Favorites { action_id, reply } => {
                    let user = self.state.user();
                    self.send_targeting(TargetingCommand::Favorites {
                        action_id,
                        user,
                        reply,
                    });
                }
                IngestionCommand::Barrier { flush, targeting } => {
                    // A closed queue drops the sender, which the waiter sees
                    let _ = self.flush_tx.send(FlushCommand::Barrier(flush));
                    let _ = self.targeting_tx.send(TargetingCommand::Barrier(targeting));
                }
            }
        }
        log_event!(debug, SUBSYSTEM, "Ingestion worker stopped");
    }

    async fn record(&self, event: Event) {
        let now = self.time.now();
        let triggers_targeting =
            self.profile.in_app_notifications_enabled && event.triggers_targeting();

        let (user, channel) = self.state.with_read(|s| (s.user.clone(), s.channel.clone()));
        let composed = compose_event(event, &user, &channel, &self.profile, now);

        let (published, depth) = self.state.with_write(|s| {
            let mut user = composed.user.clone();
            // Owned by the targeting worker, which may have written since the read
            user.visit_data = s.user.visit_data.clone();
            user.visitor_data = s.user.visitor_data.clone();
            s.user = user;
            s.channel = composed.channel.clone();
            s.events.push(composed.record.clone());
            (s.user.clone(), s.events.len())
        });
        metric_inc!(EVENTS_RECORDED);
        EVENT_QUEUE_DEPTH.set(depth as f64);

        self.user_writer.save(SUBSYSTEM).await;
        if composed.clear_target_parameters {
            log_event!(info, SUBSYSTEM, "Visitor changed, clearing target parameters");
            if self.clear_target_parameters().await {
                metric_inc!(TARGET_HISTORY_CLEARS);
            }
        }
        self.store_target_parameters(&composed.record, format_timestamp(now))
            .await;

        if triggers_targeting {
            self.send_targeting(TargetingCommand::Check {
                properties: composed.record,
                user: published,
            });
        }
        self.request_flush();
    }

    async fn clear_target_parameters(&self) -> bool {
        let persistence = Arc::clone(&self.persistence);
        persist_blocking(SUBSYSTEM, "clear_target_parameters", move || {
            persistence.clear_target_parameters()
        })
        .await
        .is_some()
    }

    async fn store_target_parameters(&self, record: &EventRecord, timestamp: String) {
        let persistence = Arc::clone(&self.persistence);
        let Some(stored) = persist_blocking(SUBSYSTEM, "load_target_parameters", move || {
            persistence.load_target_parameters()
        })
        .await
        else {
            return;
        };

        let updated = self.codec.apply(&stored, record, &timestamp);
        if updated != stored {
            let persistence = Arc::clone(&self.persistence);
            persist_blocking(SUBSYSTEM, "save_target_parameters", move || {
                persistence.save_target_parameters(&updated)
            })
            .await;
        }
    }

    async fn logout(&self) {
        let cookie_id = generate_cookie_id();
        let cookie_id = self.state.with_write(|s| {
            s.user = s.user.reset_identity(cookie_id);
            s.user.cookie_id.clone().unwrap_or_default()
        });

        self.clear_target_parameters().await;
        self.user_writer.save(SUBSYSTEM).await;
        log_event!(info, SUBSYSTEM, "Logged out", cookie_id = %cookie_id);
    }

    fn send_targeting(&self, command: TargetingCommand) {
        if self.targeting_tx.send(command).is_err() {
            log_event!(warn, SUBSYSTEM, "Targeting queue closed, command skipped");
        }
    }

    fn request_flush(&self) {
        if self.flush_tx.send(FlushCommand::Flush).is_err() {
            log_event!(warn, SUBSYSTEM, "Flush queue closed, flush skipped");
        }
    }
}
