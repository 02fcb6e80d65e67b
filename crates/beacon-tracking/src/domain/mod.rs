//! Domain layer for the tracking pipeline
//!
//! ## Modules
//! - entities: events, user state, profile, session cookie
//! - keys: wire-level property names
//! - session: visit counter policy and timestamps
//! - composer: flattening of events into queued records
//! - target_parameters: bounded history codec
//! - targeting: targeting, presentation, recommendation and subscription models

pub mod composer;
pub mod entities;
pub mod keys;
pub mod session;
pub mod target_parameters;
pub mod targeting;

pub use composer::{compose_event, ComposedEvent};
pub use entities::{
    generate_cookie_id, Event, EventRecord, ProfileConfig, Properties, SessionCookie, UserState,
    DEFAULT_CHANNEL, DEFAULT_PLATFORM, DEFAULT_REQUEST_TIMEOUT_SECS, MAX_GEOFENCE_COUNT,
};
pub use session::{advance_session, format_timestamp, SESSION_TIMEOUT_SECS, TIMESTAMP_FORMAT};
pub use target_parameters::{
    decode_entry, decode_history, Cardinality, HistoryEntry, TargetParameterCodec,
    TargetParameterDefinition, TargetParameterHistory, MAX_HISTORY_ENTRIES, STANDARD_DEFINITIONS,
};
pub use targeting::{
    parse_query_pairs, ClickReport, FavoriteAttributeResponse, FavoriteAttributes, FilterType,
    InAppNotification, PresentationModel, Product, ProductAttribute, RecommendationFilter,
    RecommendationRequest, RecommendationResponse, SubscriptionKind, SubscriptionRequest,
    TargetingAction,
};
