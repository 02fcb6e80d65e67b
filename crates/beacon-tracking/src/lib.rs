//! # beacon-tracking
//!
//! Event tracking and targeting-parameter pipeline.
//!
//! ## Overview
//!
//! Host applications record behavioral events from any thread. Each call is
//! validated and handed to a serial ingestion worker, which merges the event
//! with the user's session state, persists the user record and a bounded
//! history of targeting parameters, and hands off to:
//!
//! - **Flush**: drains the whole event queue and delivers it through a
//!   `NetworkSender` (at-most-once, no retry)
//! - **Targeting**: asks a `TargetingService` whether a notification or
//!   targeting action applies and forwards hits to `Presentation`
//!
//! ## Architecture
//!
//! ```text
//!            ┌───────────── StateStore (RwLock) ─────────────┐
//!            │  user · channel · event queue · session cookie │
//!            └───────▲──────────────▲──────────────▲──────────┘
//!                    │              │              │
//! record() ──→ [ingestion] ──→ [flush] ──→ NetworkSender
//!                    │
//!                    ├──→ PersistenceGateway (user, target parameters)
//!                    └──→ [targeting] ──→ TargetingService ──→ Presentation
//! ```
//!
//! ## Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | Queue order equals call order | single ingestion worker |
//! | Flush removes the whole queue at once | `StateStore::take_batch` |
//! | Snapshots are never half-written | all writes inside one `with_write` |
//! | History slots keep at most 9 entries | `TargetParameterCodec` |
//! | History cleared once per visitor change | `compose_event` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use beacon_tracking::{Collaborators, DeviceInfo, ProfileConfig, Tracker, TrackingApi};
//!
//! let tracker = Tracker::start(
//!     ProfileConfig::new("org", "site", "shop"),
//!     DeviceInfo::default(),
//!     Collaborators::default(),
//! )?;
//!
//! tracker.record("Home", Properties::new())?;
//! tracker.login("alice", Properties::new())?;
//! tracker.wait_idle().await?;
//! tracker.shutdown().await;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod state;

pub use domain::{
    Event, EventRecord, InAppNotification, PresentationModel, ProfileConfig, Properties,
    RecommendationRequest, RecommendationResponse, SessionCookie, TargetParameterCodec,
    TargetParameterHistory, TargetingAction, UserState,
};
pub use error::{
    CodecDecodeError, NetworkError, PersistenceError, TrackingError, TrackingResult,
    ValidationError,
};
pub use ports::inbound::TrackingApi;
pub use service::{Collaborators, DeviceInfo, Tracker, SDK_VERSION};
pub use state::{FlushBatch, StateStore, TrackerState};
