//! Ports for the tracking pipeline
//!
//! Inbound: `TrackingApi`, the surface host applications drive.
//! Outbound: storage, transport, targeting, presentation and time.

pub mod inbound;
pub mod outbound;

pub use inbound::TrackingApi;
pub use outbound::{
    NetworkSender, PersistenceGateway, Presentation, RecommendationService, SystemTimeSource,
    TargetingService, TimeSource,
};
