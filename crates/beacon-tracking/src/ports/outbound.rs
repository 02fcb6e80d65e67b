//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Everything the pipeline consumes but does not implement. Network-facing
//! ports are async; persistence is synchronous and expected to serialize its
//! own operations.

use crate::domain::{
    EventRecord, FavoriteAttributes, InAppNotification, ProfileConfig, Product,
    PresentationModel, Properties, RecommendationRequest, SessionCookie, TargetParameterHistory,
    TargetingAction, UserState,
};
use crate::error::{NetworkError, PersistenceError};
use crate::state::FlushBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Durable key-value storage for the device record, target parameter history
/// and profile.
///
/// Implementations serialize calls internally so that two writes of the same
/// logical record never interleave.
pub trait PersistenceGateway: Send + Sync {
    fn save_user(&self, user: &UserState) -> Result<(), PersistenceError>;

    /// A device without a stored record loads as `UserState::default()`.
    fn load_user(&self) -> Result<UserState, PersistenceError>;

    fn save_target_parameters(
        &self,
        history: &TargetParameterHistory,
    ) -> Result<(), PersistenceError>;

    fn load_target_parameters(&self) -> Result<TargetParameterHistory, PersistenceError>;

    fn clear_target_parameters(&self) -> Result<(), PersistenceError>;

    fn save_profile(&self, profile: &ProfileConfig) -> Result<(), PersistenceError>;

    fn load_profile(&self) -> Result<Option<ProfileConfig>, PersistenceError>;
}

/// Transport that delivers a batch of queued records to the collector.
#[async_trait]
pub trait NetworkSender: Send + Sync {
    /// Send `batch` and return the session cookie to use for the next batch.
    ///
    /// The caller also enforces `timeout`; a sender may use it to configure
    /// its own client.
    async fn send(&self, batch: FlushBatch, timeout: Duration)
        -> Result<SessionCookie, NetworkError>;
}

/// Remote targeting endpoints.
///
/// The two page-view checks are independent and single-shot. The favorite
/// attribute lookup and subscription submit are driven by explicit calls.
#[async_trait]
pub trait TargetingService: Send + Sync {
    /// Legacy in-app notification path
    async fn check_notification(
        &self,
        properties: &EventRecord,
        user: &UserState,
    ) -> Result<Option<InAppNotification>, NetworkError>;

    /// General targeting-action path
    async fn check_targeting_action(
        &self,
        properties: &EventRecord,
        user: &UserState,
    ) -> Result<Option<TargetingAction>, NetworkError>;

    /// Attribute values the visitor interacted with most, optionally for one
    /// action
    async fn favorite_attributes(
        &self,
        action_id: Option<u64>,
        user: &UserState,
    ) -> Result<FavoriteAttributes, NetworkError>;

    /// Submit a flattened email subscription
    async fn subscribe(&self, properties: &Properties) -> Result<(), NetworkError>;
}

/// Product recommendations for a zone.
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
        user: &UserState,
        channel: &str,
    ) -> Result<Vec<Product>, NetworkError>;
}

/// The single call the pipeline makes into the UI layer.
pub trait Presentation: Send + Sync {
    fn present(&self, model: PresentationModel);
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
