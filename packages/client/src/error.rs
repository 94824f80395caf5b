//! Error types for the Clipcast client.

use clipcast_server::infrastructure::dto::http::ErrorCode;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control API could not be reached or answered garbage
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The control API refused the operation
    #[error("{message} ({})", .code.as_str())]
    Rejected { code: ErrorCode, message: String },

    /// The broadcast server did not accept the password
    #[error("Password was denied by the server")]
    Denied,

    /// Connection to the broadcast server failed or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
