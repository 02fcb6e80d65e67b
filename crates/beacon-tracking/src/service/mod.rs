//! Tracker service
//!
//! `Tracker` is the handle host applications hold. It owns four serial
//! workers, each a tokio task draining its own queue:
//!
//! ```text
//! caller ──→ ingestion ──┬──→ flush ──→ NetworkSender
//!                        └──→ targeting ──→ TargetingService ──→ Presentation
//! caller ──→ recommendation ──→ RecommendationService
//! ```
//!
//! Workers share state only through the `StateStore`. Public calls validate,
//! enqueue and return; nothing a worker does is reported back to the caller
//! except `recommend` and `favorite_attributes` results. Worker persistence
//! runs on the blocking pool (see `storage`).

mod flush;
mod ingestion;
mod recommendation;
mod storage;
mod targeting;

use crate::adapters::{
    InMemoryPersistence, LoggingNetworkSender, LoggingPresentation, LoggingRecommendationService,
    NoopTargetingService,
};
use crate::domain::{
    generate_cookie_id, keys, parse_query_pairs, ClickReport, Event, EventRecord,
    FavoriteAttributeResponse, InAppNotification, ProfileConfig, Properties,
    RecommendationRequest, RecommendationResponse, SessionCookie, SubscriptionKind,
    SubscriptionRequest, TargetParameterCodec, UserState,
};
use crate::error::{TrackingError, TrackingResult, ValidationError};
use crate::ports::inbound::TrackingApi;
use crate::ports::outbound::{
    NetworkSender, PersistenceGateway, Presentation, RecommendationService, SystemTimeSource,
    TargetingService, TimeSource,
};
use crate::state::{StateStore, TrackerState};
use async_trait::async_trait;
use beacon_telemetry::{log_event, metric_inc, EVENTS_REJECTED};
use flush::FlushWorker;
use ingestion::{IngestionCommand, IngestionWorker};
use recommendation::{RecommendCommand, RecommendationWorker};
use std::sync::Arc;
use storage::{persist, UserRecordWriter};
use targeting::TargetingWorker;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// SDK version stamped on every user record
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const SUBSYSTEM: &str = "tracker";

/// External collaborators injected at start.
#[derive(Clone)]
pub struct Collaborators {
    pub persistence: Arc<dyn PersistenceGateway>,
    pub network: Arc<dyn NetworkSender>,
    pub targeting: Arc<dyn TargetingService>,
    pub recommendation: Arc<dyn RecommendationService>,
    pub presentation: Arc<dyn Presentation>,
    pub time: Arc<dyn TimeSource>,
}

impl Default for Collaborators {
    /// In-memory storage, logging transport, recommendations and
    /// presentation, no targeting.
    fn default() -> Self {
        Self {
            persistence: Arc::new(InMemoryPersistence::new()),
            network: Arc::new(LoggingNetworkSender::new()),
            targeting: Arc::new(NoopTargetingService),
            recommendation: Arc::new(LoggingRecommendationService),
            presentation: Arc::new(LoggingPresentation),
            time: Arc::new(SystemTimeSource),
        }
    }
}

impl Collaborators {
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceGateway>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkSender>) -> Self {
        self.network = network;
        self
    }

    pub fn with_targeting(mut self, targeting: Arc<dyn TargetingService>) -> Self {
        self.targeting = targeting;
        self
    }

    pub fn with_recommendation(mut self, recommendation: Arc<dyn RecommendationService>) -> Self {
        self.recommendation = recommendation;
        self
    }

    pub fn with_presentation(mut self, presentation: Arc<dyn Presentation>) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn with_time(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }
}

/// Facts about the host device stamped onto the user record at start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub app_version: Option<String>,
    pub user_agent: Option<String>,
    /// Only recorded when the profile enables IDFA
    pub advertising_id: Option<String>,
}

/// Handle to a running tracking pipeline.
pub struct Tracker {
    profile: ProfileConfig,
    state: Arc<StateStore>,
    ingestion_tx: mpsc::UnboundedSender<IngestionCommand>,
    recommendation_tx: mpsc::UnboundedSender<RecommendCommand>,
    workers: Vec<JoinHandle<()>>,
}

impl Tracker {
    /// Validate the profile, load the device record and spawn the workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        profile: ProfileConfig,
        device: DeviceInfo,
        collaborators: Collaborators,
    ) -> TrackingResult<Self> {
        let profile = profile.validate()?;
        persist(
            SUBSYSTEM,
            "save_profile",
            collaborators.persistence.save_profile(&profile),
        );

        let user = persist(SUBSYSTEM, "load_user", collaborators.persistence.load_user())
            .unwrap_or_default();
        let user = stamp_device(user, &device, &profile);
        persist(
            SUBSYSTEM,
            "save_user",
            collaborators.persistence.save_user(&user),
        );

        let state = Arc::new(StateStore::new(TrackerState {
            user,
            channel: profile.channel.clone(),
            events: Vec::new(),
            cookie: SessionCookie::new(),
        }));

        let (ingestion_tx, ingestion_rx) = mpsc::unbounded_channel();
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let (targeting_tx, targeting_rx) = mpsc::unbounded_channel();
        let (recommendation_tx, recommendation_rx) = mpsc::unbounded_channel();

        let Collaborators {
            persistence,
            network,
            targeting,
            recommendation,
            presentation,
            time,
        } = collaborators;
        let timeout = profile.request_timeout();
        let user_writer = UserRecordWriter::new(Arc::clone(&state), Arc::clone(&persistence));

        let ingestion = IngestionWorker {
            profile: profile.clone(),
            state: Arc::clone(&state),
            persistence,
            user_writer: user_writer.clone(),
            time,
            codec: TargetParameterCodec::default(),
            flush_tx,
            targeting_tx,
        };
        let flush = FlushWorker {
            state: Arc::clone(&state),
            network,
            timeout,
        };
        let targeting = TargetingWorker {
            state: Arc::clone(&state),
            user_writer,
            targeting,
            presentation,
            timeout,
        };
        let recommendation = RecommendationWorker {
            state: Arc::clone(&state),
            service: recommendation,
            timeout,
        };

        let workers = vec![
            tokio::spawn(ingestion.run(ingestion_rx)),
            tokio::spawn(flush.run(flush_rx)),
            tokio::spawn(targeting.run(targeting_rx)),
            tokio::spawn(recommendation.run(recommendation_rx)),
        ];

        log_event!(
            info,
            SUBSYSTEM,
            "Tracker started",
            organization_id = %profile.organization_id,
            profile_id = %profile.profile_id,
            channel = %profile.channel
        );

        Ok(Self {
            profile,
            state,
            ingestion_tx,
            recommendation_tx,
            workers,
        })
    }

    /// Start from the profile saved by a previous run.
    ///
    /// Returns `Ok(None)` when no profile has been saved yet.
    pub fn restore(device: DeviceInfo, collaborators: Collaborators) -> TrackingResult<Option<Self>> {
        match collaborators.persistence.load_profile()? {
            Some(profile) => Self::start(profile, device, collaborators).map(Some),
            None => Ok(None),
        }
    }

    pub fn profile(&self) -> &ProfileConfig {
        &self.profile
    }

    pub fn ex_visitor_id(&self) -> Option<String> {
        self.state.with_read(|s| s.user.ex_visitor_id.clone())
    }

    pub fn user(&self) -> UserState {
        self.state.user()
    }

    pub fn channel(&self) -> String {
        self.state.channel()
    }

    pub fn pending_events(&self) -> Vec<EventRecord> {
        self.state.pending_events()
    }

    pub fn session_cookie(&self) -> SessionCookie {
        self.state.session_cookie()
    }

    /// Close every queue, let the workers drain what was already enqueued,
    /// and wait for them to exit.
    pub async fn shutdown(self) {
        let Self {
            ingestion_tx,
            recommendation_tx,
            workers,
            ..
        } = self;
        drop(ingestion_tx);
        drop(recommendation_tx);

        for worker in workers {
            if let Err(e) = worker.await {
                log_event!(error, SUBSYSTEM, "Worker ended abnormally", error = %e);
            }
        }
        log_event!(info, SUBSYSTEM, "Tracker stopped");
    }

    fn enqueue(&self, command: IngestionCommand) -> TrackingResult<()> {
        self.ingestion_tx
            .send(command)
            .map_err(|_| TrackingError::WorkerStopped { worker: "ingestion" })
    }

    fn reject(&self, operation: &'static str, error: ValidationError) -> TrackingError {
        metric_inc!(EVENTS_REJECTED);
        log_event!(warn, SUBSYSTEM, "Rejected call", operation = operation, error = %error);
        error.into()
    }

    fn identify(
        &self,
        operation: &'static str,
        page_name: &str,
        marker: &str,
        flag: &str,
        ex_visitor_id: &str,
        mut properties: Properties,
    ) -> TrackingResult<()> {
        if ex_visitor_id.trim().is_empty() {
            return Err(self.reject(operation, ValidationError::EmptyExVisitorId));
        }
        properties.insert(keys::EX_VISITOR_ID.to_string(), ex_visitor_id.to_string());
        properties.insert(marker.to_string(), ex_visitor_id.to_string());
        properties.insert(flag.to_string(), marker.to_string());
        self.record(page_name, properties)
    }

    fn record_pixel(&self, properties: Properties) -> TrackingResult<()> {
        let event = Event::page_view(keys::TRACKING_PIXEL_PAGE, properties)
            .map_err(|e| self.reject("pixel", e))?;
        self.enqueue(IngestionCommand::Record(event))
    }

    /// Pixel event for a click report.
    fn click_pixel(&self, report: ClickReport) -> Properties {
        let mut properties = Properties::new();
        properties.insert(keys::DOMAIN.to_string(), self.profile.pixel_domain());
        properties.insert(keys::ZONE_NAME.to_string(), report.zone_name);
        properties.insert(keys::ZONE_POSITION.to_string(), report.zone_position);
        properties
    }

    fn subscription(
        &self,
        operation: &'static str,
        kind: SubscriptionKind,
        action_id: &str,
        auth: &str,
        email: &str,
    ) -> TrackingResult<SubscriptionRequest> {
        SubscriptionRequest::new(kind, action_id, auth, email).map_err(|e| self.reject(operation, e))
    }
}

/// Apply device facts and make sure the user has a cookie id.
fn stamp_device(mut user: UserState, device: &DeviceInfo, profile: &ProfileConfig) -> UserState {
    user.sdk_version = Some(SDK_VERSION.to_string());
    if device.app_version.is_some() {
        user.app_version = device.app_version.clone();
    }
    if device.user_agent.is_some() {
        user.user_agent = device.user_agent.clone();
    }
    user.identifier_for_advertising = if profile.idfa_enabled {
        device.advertising_id.clone()
    } else {
        None
    };
    if !user.has_cookie_id() {
        user.cookie_id = Some(generate_cookie_id());
    }
    user
}

#[async_trait]
impl TrackingApi for Tracker {
    fn record(&self, page_name: &str, properties: Properties) -> TrackingResult<()> {
        let event = Event::page_view(page_name, properties).map_err(|e| self.reject("record", e))?;
        self.enqueue(IngestionCommand::Record(event))
    }

    fn send_campaign_parameters(&self, properties: Properties) -> TrackingResult<()> {
        self.enqueue(IngestionCommand::Record(Event::campaign(properties)))
    }

    fn login(&self, ex_visitor_id: &str, properties: Properties) -> TrackingResult<()> {
        self.identify(
            "login",
            keys::LOGIN_PAGE,
            keys::LOGIN,
            keys::LOGIN_FLAG,
            ex_visitor_id,
            properties,
        )
    }

    fn sign_up(&self, ex_visitor_id: &str, properties: Properties) -> TrackingResult<()> {
        self.identify(
            "sign_up",
            keys::SIGN_UP_PAGE,
            keys::SIGN_UP,
            keys::SIGN_UP_FLAG,
            ex_visitor_id,
            properties,
        )
    }

    fn logout(&self) -> TrackingResult<()> {
        self.enqueue(IngestionCommand::Logout)
    }

    fn flush(&self) -> TrackingResult<()> {
        self.enqueue(IngestionCommand::Flush)
    }

    fn track_recommendation_click(&self, query_string: &str) -> TrackingResult<()> {
        let pairs = parse_query_pairs(query_string)
            .map_err(|e| self.reject("track_recommendation_click", e))?;

        let mut properties = Properties::new();
        properties.insert(keys::DOMAIN.to_string(), self.profile.pixel_domain());
        properties.extend(pairs);
        self.record_pixel(properties)
    }

    fn track_notification_click(&self, notification: &InAppNotification) -> TrackingResult<()> {
        let query = notification.query_string.as_deref().unwrap_or_default();
        let report =
            ClickReport::parse(query).map_err(|e| self.reject("track_notification_click", e))?;
        self.record_pixel(self.click_pixel(report))
    }

    fn subscribe_mail(
        &self,
        click: &str,
        action_id: &str,
        auth: &str,
        email: &str,
    ) -> TrackingResult<()> {
        let report =
            ClickReport::parse_keyed(click).map_err(|e| self.reject("subscribe_mail", e))?;
        let request = self.subscription(
            "subscribe_mail",
            SubscriptionKind::Email,
            action_id,
            auth,
            email,
        )?;
        self.record_pixel(self.click_pixel(report))?;
        self.enqueue(IngestionCommand::Subscribe(request))
    }

    fn track_spin_to_win_click(&self, click: &str) -> TrackingResult<()> {
        let report = ClickReport::parse_keyed(click)
            .map_err(|e| self.reject("track_spin_to_win_click", e))?;
        self.record_pixel(self.click_pixel(report))
    }

    fn subscribe_spin_to_win_mail(
        &self,
        action_id: &str,
        auth: &str,
        email: &str,
    ) -> TrackingResult<()> {
        let request = self.subscription(
            "subscribe_spin_to_win_mail",
            SubscriptionKind::SpinToWinEmail,
            action_id,
            auth,
            email,
        )?;
        self.enqueue(IngestionCommand::Subscribe(request))
    }

    async fn favorite_attributes(
        &self,
        action_id: Option<u64>,
    ) -> TrackingResult<FavoriteAttributeResponse> {
        let (reply, response) = oneshot::channel();
        self.enqueue(IngestionCommand::Favorites { action_id, reply })?;
        response
            .await
            .map_err(|_| TrackingError::WorkerStopped { worker: "targeting" })
    }

    async fn recommend(
        &self,
        request: RecommendationRequest,
    ) -> TrackingResult<RecommendationResponse> {
        let stopped = || TrackingError::WorkerStopped {
            worker: "recommendation",
        };
        let (reply, response) = oneshot::channel();
        self.recommendation_tx
            .send(RecommendCommand { request, reply })
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }

    async fn wait_idle(&self) -> TrackingResult<()> {
        let (flush, flush_done) = oneshot::channel();
        let (targeting, targeting_done) = oneshot::channel();
        self.enqueue(IngestionCommand::Barrier { flush, targeting })?;

        flush_done
            .await
            .map_err(|_| TrackingError::WorkerStopped { worker: "flush" })?;
        targeting_done
            .await
            .map_err(|_| TrackingError::WorkerStopped { worker: "targeting" })
    }
}
