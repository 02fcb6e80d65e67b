//! Event composition
//!
//! Pure step of the ingestion pipeline: given the current user snapshot and
//! channel, flatten an incoming event into the record that is queued for
//! flush, and compute the next user state.

use super::entities::{non_blank, Event, EventRecord, ProfileConfig, UserState};
use super::keys;
use super::session::advance_session;
use chrono::{DateTime, Utc};

/// Output of `compose_event`, published atomically by the ingestion worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedEvent {
    pub record: EventRecord,
    pub user: UserState,
    pub channel: String,
    /// External visitor id switched between two different non-empty values
    pub clear_target_parameters: bool,
}

/// Flatten `event` with the user and session fields.
pub fn compose_event(
    event: Event,
    user: &UserState,
    channel: &str,
    profile: &ProfileConfig,
    now: DateTime<Utc>,
) -> ComposedEvent {
    let counts_as_page_view = event.page_name().is_some() && !event.is_tracking_pixel();
    let (page_name, mut properties) = event.into_parts();

    let mut user = user.clone();
    advance_session(&mut user, counts_as_page_view, now);

    if let Some(cookie_id) = properties.remove(keys::COOKIE_ID) {
        user.cookie_id = Some(cookie_id);
    }

    let mut clear_target_parameters = false;
    if let Some(ex_visitor_id) = properties.remove(keys::EX_VISITOR_ID) {
        let previous = non_blank(user.ex_visitor_id.as_deref());
        let incoming = non_blank(Some(ex_visitor_id.as_str()));
        if let (Some(previous), Some(incoming)) = (previous, incoming) {
            clear_target_parameters = previous != incoming;
        }
        user.ex_visitor_id = Some(ex_visitor_id);
    }

    if let Some(token_id) = properties.remove(keys::TOKEN_ID) {
        user.token_id = Some(token_id);
    }
    if let Some(app_id) = properties.remove(keys::APP_ID) {
        user.app_id = Some(app_id);
    }

    let channel = match properties.remove(keys::CHANNEL) {
        Some(requested) if !requested.trim().is_empty() => requested,
        _ => channel.to_string(),
    };

    let mut record = properties;

    put(&mut record, keys::ORGANIZATION_ID, profile.organization_id.clone());
    put(&mut record, keys::PROFILE_ID, profile.profile_id.clone());
    put(&mut record, keys::CHANNEL, channel.clone());
    put(&mut record, keys::MOBILE_APPLICATION, keys::TRUE.to_string());
    put(&mut record, keys::API_VERSION, profile.platform.clone());
    put(
        &mut record,
        keys::MOBILE_ID,
        user.identifier_for_advertising.clone().unwrap_or_default(),
    );
    put(&mut record, keys::NRV, user.nrv.to_string());
    put(&mut record, keys::PVIV, user.pviv.to_string());
    put(&mut record, keys::TVC, user.tvc.to_string());
    put(&mut record, keys::DAT, now.timestamp().to_string());

    if let Some(page_name) = page_name {
        put(&mut record, keys::URI, page_name);
    }

    let optional = [
        (keys::COOKIE_ID, user.cookie_id.as_deref()),
        (keys::EX_VISITOR_ID, user.ex_visitor_id.as_deref()),
        (keys::TOKEN_ID, user.token_id.as_deref()),
        (keys::APP_ID, user.app_id.as_deref()),
        (keys::SDK_VERSION, user.sdk_version.as_deref()),
        (keys::APP_VERSION, user.app_version.as_deref()),
        (keys::LVT, user.last_visit_time.as_deref()),
    ];
    for (key, value) in optional {
        match non_blank(value) {
            Some(value) => put(&mut record, key, value.to_string()),
            // Caller-supplied value must not leak through an omitted field
            None => {
                record.remove(key);
            }
        }
    }

    ComposedEvent {
        record,
        user,
        channel,
        clear_target_parameters,
    }
}

fn put(record: &mut EventRecord, key: &str, value: String) {
    record.insert(key.to_string(), value);
}
