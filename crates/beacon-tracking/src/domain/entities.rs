//! Core entities for the tracking pipeline
//!
//! Everything here is plain data. Mutation of the shared instances happens
//! only inside `StateStore::with_write`.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Caller-supplied event properties.
///
/// Keys and values are kept exactly as given; recipients do not depend on
/// iteration order.
pub type Properties = BTreeMap<String, String>;

/// A flattened event: caller properties merged with user and session fields.
pub type EventRecord = BTreeMap<String, String>;

/// Default channel when none is configured
pub const DEFAULT_CHANNEL: &str = "RUST";

/// Default platform tag written to `OM.apiver`
pub const DEFAULT_PLATFORM: &str = "RUST";

/// Default request timeout for network collaborators
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Upper bound for monitored geofences
pub const MAX_GEOFENCE_COUNT: u8 = 20;

/// A behavioral event as handed to the pipeline. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    page_name: Option<String>,
    properties: Properties,
}

impl Event {
    /// A page-view style event. The page name must be non-blank.
    pub fn page_view(
        page_name: impl Into<String>,
        properties: Properties,
    ) -> Result<Self, ValidationError> {
        let page_name = page_name.into();
        if page_name.trim().is_empty() {
            return Err(ValidationError::EmptyPageName);
        }
        Ok(Self {
            page_name: Some(page_name),
            properties,
        })
    }

    /// A campaign-parameter event. Carries no page name.
    pub fn campaign(properties: Properties) -> Self {
        Self {
            page_name: None,
            properties,
        }
    }

    pub fn page_name(&self) -> Option<&str> {
        self.page_name.as_deref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// True for the internal tracking-pixel events emitted on clicks.
    pub fn is_tracking_pixel(&self) -> bool {
        self.page_name.as_deref() == Some(super::keys::TRACKING_PIXEL_PAGE)
    }

    /// Only page views that are not tracking pixels trigger targeting checks.
    pub fn triggers_targeting(&self) -> bool {
        self.page_name.is_some() && !self.is_tracking_pixel()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Properties) {
        (self.page_name, self.properties)
    }
}

/// Identity and session state of the device user.
///
/// Single logical owner: the `StateStore`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    pub cookie_id: Option<String>,
    pub ex_visitor_id: Option<String>,
    pub token_id: Option<String>,
    pub app_id: Option<String>,
    pub visit_data: Option<String>,
    pub visitor_data: Option<String>,
    pub user_agent: Option<String>,
    pub identifier_for_advertising: Option<String>,
    pub sdk_version: Option<String>,
    pub app_version: Option<String>,
    /// Time of the last recorded event, `yyyy-MM-dd HH:mm:ss`
    pub last_event_time: Option<String>,
    /// Start of the current visit, `yyyy-MM-dd HH:mm:ss`
    pub last_visit_time: Option<String>,
    /// 1 during the first visit, 0 afterwards
    pub nrv: u64,
    /// Page views in the current visit
    pub pviv: u64,
    /// Total visit count
    pub tvc: u64,
}

impl UserState {
    /// Fresh identity for the same device: identity and session fields are
    /// dropped, device facts are kept.
    pub fn reset_identity(&self, cookie_id: String) -> Self {
        Self {
            cookie_id: Some(cookie_id),
            user_agent: self.user_agent.clone(),
            identifier_for_advertising: self.identifier_for_advertising.clone(),
            sdk_version: self.sdk_version.clone(),
            app_version: self.app_version.clone(),
            ..Self::default()
        }
    }

    pub fn has_cookie_id(&self) -> bool {
        non_blank(self.cookie_id.as_deref()).is_some()
    }
}

/// Generate a fresh device cookie id.
pub fn generate_cookie_id() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// Returns the value when it contains something besides whitespace.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Static configuration of a tracker instance.
///
/// `channel` is the only field mutated after construction (by event recording).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub organization_id: String,
    pub profile_id: String,
    pub data_source: String,
    pub channel: String,
    pub request_timeout_seconds: u64,
    pub geofence_enabled: bool,
    pub in_app_notifications_enabled: bool,
    pub max_geofence_count: u8,
    pub idfa_enabled: bool,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

impl ProfileConfig {
    /// Profile with default flags: in-app notifications and IDFA enabled,
    /// geofencing disabled.
    pub fn new(
        organization_id: impl Into<String>,
        profile_id: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            profile_id: profile_id.into(),
            data_source: data_source.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            geofence_enabled: false,
            in_app_notifications_enabled: true,
            max_geofence_count: MAX_GEOFENCE_COUNT,
            idfa_enabled: true,
            platform: default_platform(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    pub fn with_in_app_notifications(mut self, enabled: bool) -> Self {
        self.in_app_notifications_enabled = enabled;
        self
    }

    pub fn with_idfa(mut self, enabled: bool) -> Self {
        self.idfa_enabled = enabled;
        self
    }

    pub fn with_geofence(mut self, enabled: bool, max_count: u8) -> Self {
        self.geofence_enabled = enabled;
        self.max_geofence_count = max_count.min(MAX_GEOFENCE_COUNT);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Tag written to `OM.domain` on tracking-pixel events.
    pub fn pixel_domain(&self) -> String {
        format!("{}_{}", self.data_source, self.platform)
    }

    /// Validate and normalise the profile.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - organization, profile or data source is blank
    /// - request timeout is zero
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        let required = [
            ("organization_id", &self.organization_id),
            ("profile_id", &self.profile_id),
            ("data_source", &self.data_source),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidProfile {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::InvalidProfile {
                field: "request_timeout_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.channel.trim().is_empty() {
            self.channel = DEFAULT_CHANNEL.to_string();
        }
        self.max_geofence_count = self.max_geofence_count.min(MAX_GEOFENCE_COUNT);
        Ok(self)
    }
}

/// Opaque session state returned by the collector after a flush and fed into
/// the next one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    entries: BTreeMap<String, String>,
}

impl SessionCookie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
