//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports. `Mock*` adapters are public so
//! integration tests and host applications can script collaborators.

mod network;
mod persistence;
mod presentation;
mod targeting;
mod time;

pub use network::{LoggingNetworkSender, MockNetworkSender, MockSendBehavior, BATCH_SEQUENCE_COOKIE};
pub use persistence::{InMemoryPersistence, JsonFilePersistence, FORMAT_VERSION};
pub use presentation::{LoggingPresentation, MockPresentation};
pub use targeting::{
    LoggingRecommendationService, MockRecommendationService, MockTargetingService,
    NoopTargetingService, TargetingCall,
};
pub use time::MockTimeSource;
