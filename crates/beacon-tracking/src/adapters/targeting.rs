//! Targeting and recommendation adapters

use crate::domain::{
    EventRecord, FavoriteAttributes, InAppNotification, Product, Properties,
    RecommendationRequest, TargetingAction, UserState,
};
use crate::error::NetworkError;
use crate::ports::outbound::{RecommendationService, TargetingService};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Never resolves anything. Default when no targeting endpoint exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTargetingService;

#[async_trait]
impl TargetingService for NoopTargetingService {
    async fn check_notification(
        &self,
        _properties: &EventRecord,
        _user: &UserState,
    ) -> Result<Option<InAppNotification>, NetworkError> {
        Ok(None)
    }

    async fn check_targeting_action(
        &self,
        _properties: &EventRecord,
        _user: &UserState,
    ) -> Result<Option<TargetingAction>, NetworkError> {
        Ok(None)
    }

    async fn favorite_attributes(
        &self,
        _action_id: Option<u64>,
        _user: &UserState,
    ) -> Result<FavoriteAttributes, NetworkError> {
        Ok(FavoriteAttributes::new())
    }

    async fn subscribe(&self, _properties: &Properties) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// Logs the lookup parameters and returns no products.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingRecommendationService;

#[async_trait]
impl RecommendationService for LoggingRecommendationService {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
        _user: &UserState,
        channel: &str,
    ) -> Result<Vec<Product>, NetworkError> {
        let params = serde_json::to_string(&request.query_parameters()).map_err(|e| {
            NetworkError::InvalidResponse {
                reason: e.to_string(),
            }
        })?;
        tracing::info!(
            subsystem = "recommendation",
            channel = channel,
            params = %params,
            "Recommendation lookup"
        );
        Ok(Vec::new())
    }
}

/// One targeting lookup as seen by `MockTargetingService`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetingCall {
    pub kind: &'static str,
    pub properties: EventRecord,
    pub user: UserState,
}

/// Scripted targeting answers for tests.
#[derive(Default)]
pub struct MockTargetingService {
    notification: RwLock<Option<Result<InAppNotification, NetworkError>>>,
    action: RwLock<Option<Result<TargetingAction, NetworkError>>>,
    favorites: RwLock<Option<Result<FavoriteAttributes, NetworkError>>>,
    subscribe_error: RwLock<Option<NetworkError>>,
    calls: RwLock<Vec<TargetingCall>>,
    subscriptions: RwLock<Vec<Properties>>,
}

impl MockTargetingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notification(self, result: Result<InAppNotification, NetworkError>) -> Self {
        *self.notification.write() = Some(result);
        self
    }

    pub fn with_action(self, result: Result<TargetingAction, NetworkError>) -> Self {
        *self.action.write() = Some(result);
        self
    }

    pub fn with_favorites(self, result: Result<FavoriteAttributes, NetworkError>) -> Self {
        *self.favorites.write() = Some(result);
        self
    }

    pub fn with_subscribe_error(self, error: NetworkError) -> Self {
        *self.subscribe_error.write() = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<TargetingCall> {
        self.calls.read().clone()
    }

    /// Subscription submits received, in order.
    pub fn subscriptions(&self) -> Vec<Properties> {
        self.subscriptions.read().clone()
    }

    fn log_call(&self, kind: &'static str, properties: &EventRecord, user: &UserState) {
        self.calls.write().push(TargetingCall {
            kind,
            properties: properties.clone(),
            user: user.clone(),
        });
    }
}

#[async_trait]
impl TargetingService for MockTargetingService {
    async fn check_notification(
        &self,
        properties: &EventRecord,
        user: &UserState,
    ) -> Result<Option<InAppNotification>, NetworkError> {
        self.log_call("notification", properties, user);
        self.notification.read().clone().transpose()
    }

    async fn check_targeting_action(
        &self,
        properties: &EventRecord,
        user: &UserState,
    ) -> Result<Option<TargetingAction>, NetworkError> {
        self.log_call("action", properties, user);
        self.action.read().clone().transpose()
    }

    async fn favorite_attributes(
        &self,
        _action_id: Option<u64>,
        user: &UserState,
    ) -> Result<FavoriteAttributes, NetworkError> {
        self.log_call("favorites", &EventRecord::new(), user);
        self.favorites
            .read()
            .clone()
            .unwrap_or_else(|| Ok(FavoriteAttributes::new()))
    }

    async fn subscribe(&self, properties: &Properties) -> Result<(), NetworkError> {
        self.subscriptions.write().push(properties.clone());
        match self.subscribe_error.read().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Scripted recommendation answers for tests.
pub struct MockRecommendationService {
    response: Result<Vec<Product>, NetworkError>,
    requests: RwLock<Vec<(RecommendationRequest, String)>>,
}

impl MockRecommendationService {
    pub fn new(response: Result<Vec<Product>, NetworkError>) -> Self {
        Self {
            response,
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Requests received, with the channel each was made on.
    pub fn requests(&self) -> Vec<(RecommendationRequest, String)> {
        self.requests.read().clone()
    }
}

#[async_trait]
impl RecommendationService for MockRecommendationService {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
        _user: &UserState,
        channel: &str,
    ) -> Result<Vec<Product>, NetworkError> {
        self.requests
            .write()
            .push((request.clone(), channel.to_string()));
        self.response.clone()
    }
}
