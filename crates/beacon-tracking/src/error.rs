//! Error types for the tracking pipeline
//!
//! No error in this crate is allowed to take the process down. Each one is
//! absorbed where it happens: validation failures are logged and returned to
//! the caller without touching state, persistence failures leave in-memory
//! state authoritative, network failures drop the batch or yield no targeting
//! result, and malformed history fragments are discarded.

use thiserror::Error;

/// Rejected caller input. The call performs no mutation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Page name is empty after trimming
    #[error("page name must not be empty")]
    EmptyPageName,

    /// External visitor id is empty after trimming
    #[error("exVisitorId must not be empty")]
    EmptyExVisitorId,

    /// Subscription email is empty after trimming
    #[error("subscription email must not be empty")]
    EmptyEmail,

    /// Click query string lacks the expected `k=v&k=v` shape
    #[error("malformed query string: {query:?}")]
    MalformedQueryString { query: String },

    /// Profile configuration field is invalid
    #[error("invalid profile configuration: {field} {reason}")]
    InvalidProfile { field: &'static str, reason: String },
}

/// Durable storage failure. In-memory state remains authoritative.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// Underlying I/O failed
    #[error("persistence I/O error: {reason}")]
    Io { reason: String },

    /// Record could not be encoded or decoded
    #[error("persistence serialization error: {reason}")]
    Serialization { reason: String },

    /// Record was written by an incompatible format version
    #[error("unsupported record version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Remote call failure. Flush batches are dropped, targeting yields nothing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Call exceeded the configured request timeout
    #[error("request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    /// Transport-level failure (connection, TLS, DNS...)
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Remote side answered with a non-success status
    #[error("request rejected with status {status}")]
    Rejected { status: u16 },

    /// Response body could not be interpreted
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// A stored history fragment that does not split into `value|timestamp`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed history fragment {fragment:?}: expected 2 fields, found {fields}")]
pub struct CodecDecodeError {
    pub fragment: String,
    pub fields: usize,
}

/// Umbrella error for the tracker's public surface
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TrackingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A worker queue has shut down and can no longer accept work
    #[error("{worker} worker is not running")]
    WorkerStopped { worker: &'static str },
}

/// Result type for tracking operations
pub type TrackingResult<T> = Result<T, TrackingError>;
