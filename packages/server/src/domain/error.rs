//! Error types of the broadcast domain.

use thiserror::Error;

use super::PeerId;

/// Failure of `ServerLifecycle::start`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartError {
    /// The server is starting, running, or faulted at runtime and not yet stopped.
    #[error("server is already active")]
    AlreadyActive,

    /// The listening endpoint could not be bound.
    #[error("failed to bind listening endpoint: {0}")]
    BindFailed(String),
}

/// Failure of `ServerLifecycle::stop`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StopError {
    #[error("server is not active")]
    NotActive,
}

/// Failure of a broadcast as a whole. Per-peer failures are data, not errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("server is not running")]
    NotRunning,

    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("failed to encode payload: {0}")]
    Encoding(String),
}

/// Failure to register a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A peer with this identifier is already registered.
    #[error("peer '{0}' is already registered")]
    DuplicateId(PeerId),

    /// The server is not running, so no peer can be admitted.
    #[error("server is not accepting peers")]
    NotAccepting,
}

/// Failure to write to or close a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Failure to read the clipboard. The monitor logs it and tries again on the
/// next poll.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode clipboard image: {0}")]
    Image(String),
}
