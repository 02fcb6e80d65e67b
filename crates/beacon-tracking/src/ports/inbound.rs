//! Driving Ports (API - Inbound)
//!
//! Every call validates its input, enqueues work on the owning serial worker
//! and returns. Only `recommend`, `favorite_attributes` and `wait_idle` wait
//! for a result.

use crate::domain::{
    FavoriteAttributeResponse, InAppNotification, Properties, RecommendationRequest,
    RecommendationResponse,
};
use crate::error::TrackingResult;
use async_trait::async_trait;

#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Record a page view.
    ///
    /// # Returns
    /// `Err(Validation)` when `page_name` is blank; nothing is queued then.
    fn record(&self, page_name: &str, properties: Properties) -> TrackingResult<()>;

    /// Record campaign parameters. No page name, never triggers targeting.
    fn send_campaign_parameters(&self, properties: Properties) -> TrackingResult<()>;

    /// Record a `LoginPage` view for `ex_visitor_id`.
    fn login(&self, ex_visitor_id: &str, properties: Properties) -> TrackingResult<()>;

    /// Record a `SignUpPage` view for `ex_visitor_id`.
    fn sign_up(&self, ex_visitor_id: &str, properties: Properties) -> TrackingResult<()>;

    /// Drop identity and history, start over with a fresh cookie id.
    fn logout(&self) -> TrackingResult<()>;

    /// Send whatever is queued.
    fn flush(&self) -> TrackingResult<()>;

    /// Report a click on a recommended product (`k=v&k=v...`).
    fn track_recommendation_click(&self, query_string: &str) -> TrackingResult<()>;

    /// Report a click on an in-app notification.
    fn track_notification_click(&self, notification: &InAppNotification) -> TrackingResult<()>;

    /// Report a mail-form submit (`click` is the form's `OM.zn`/`OM.zpc`
    /// report) and submit the email subscription.
    fn subscribe_mail(
        &self,
        click: &str,
        action_id: &str,
        auth: &str,
        email: &str,
    ) -> TrackingResult<()>;

    /// Report a click inside a spin-to-win action.
    fn track_spin_to_win_click(&self, click: &str) -> TrackingResult<()>;

    /// Submit the email collected by a spin-to-win action.
    fn subscribe_spin_to_win_mail(
        &self,
        action_id: &str,
        auth: &str,
        email: &str,
    ) -> TrackingResult<()>;

    /// Look up the visitor's favorite attribute values on the targeting worker.
    async fn favorite_attributes(
        &self,
        action_id: Option<u64>,
    ) -> TrackingResult<FavoriteAttributeResponse>;

    /// Resolve product recommendations on the recommendation worker.
    async fn recommend(&self, request: RecommendationRequest)
        -> TrackingResult<RecommendationResponse>;

    /// Resolve once all work enqueued before this call has been processed.
    async fn wait_idle(&self) -> TrackingResult<()>;
}
