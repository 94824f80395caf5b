//! JSON bodies exchanged over the control API.

use serde::{Deserialize, Serialize};

use crate::domain::ServerState;

/// Body of `start_server`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartServerRequest {
    pub password: String,
}

/// Body of `broadcast_message_command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessageRequest {
    pub message: String,
}

/// Result of `get_server_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatusDto {
    pub state: ServerState,
    pub peer_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Result of `broadcast_message_command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResultDto {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedDeliveryDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeliveryDto {
    pub peer_id: String,
    pub reason: String,
}

/// Stable error codes of the control boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AlreadyActive,
    BindFailed,
    NotActive,
    NotRunning,
    MessageTooLarge,
    /// The request body is not valid JSON for the operation.
    InvalidRequest,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyActive => "already_active",
            Self::BindFailed => "bind_failed",
            Self::NotActive => "not_active",
            Self::NotRunning => "not_running",
            Self::MessageTooLarge => "message_too_large",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        }
    }
}

/// Error body of every failed control call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}
