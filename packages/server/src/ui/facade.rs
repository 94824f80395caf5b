//! Facade: サーバー制御の境界
//!
//! `ControlFacade` exposes the four control operations with boundary DTOs and
//! stable error codes. It knows nothing about HTTP; the handlers in
//! `ui::handler` are a thin adapter over it.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;

use crate::{
    config::LifecycleConfig,
    domain::{BroadcastError, StartError, StopError, Timestamp},
    infrastructure::dto::http::{
        BroadcastMessageRequest, BroadcastResultDto, ErrorCode, ErrorResponse,
        ServerStatusDto, StartServerRequest,
    },
    usecase::ServerLifecycle,
};

/// 制御操作のエラー
///
/// Error of a control operation, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ControlError {
    /// 安定したエラーコード（HTTP ステータスの決定にも使う）
    pub code: ErrorCode,
    /// 人間向けのメッセージ
    pub message: String,
}

impl ControlError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<StartError> for ControlError {
    fn from(e: StartError) -> Self {
        let code = match e {
            StartError::AlreadyActive => ErrorCode::AlreadyActive,
            StartError::BindFailed(_) => ErrorCode::BindFailed,
        };
        Self::new(code, e.to_string())
    }
}

impl From<StopError> for ControlError {
    fn from(e: StopError) -> Self {
        let code = match e {
            StopError::NotActive => ErrorCode::NotActive,
        };
        Self::new(code, e.to_string())
    }
}

impl From<BroadcastError> for ControlError {
    fn from(e: BroadcastError) -> Self {
        let code = match e {
            BroadcastError::NotRunning => ErrorCode::NotRunning,
            BroadcastError::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            BroadcastError::Encoding(_) => ErrorCode::Internal,
        };
        Self::new(code, e.to_string())
    }
}

impl From<JoinError> for ControlError {
    fn from(e: JoinError) -> Self {
        tracing::error!("Control task failed: {}", e);
        Self::new(ErrorCode::Internal, "control task failed")
    }
}

impl From<ControlError> for ErrorResponse {
    fn from(e: ControlError) -> Self {
        Self {
            code: e.code,
            message: e.message,
        }
    }
}

/// サーバー制御のファサード
///
/// Facade over `ServerLifecycle` for the control boundary.
///
/// Every operation runs on its own task. Dropping the returned future (for
/// example when an HTTP client disconnects) does not cancel the lifecycle
/// transition underneath it.
#[derive(Clone)]
pub struct ControlFacade {
    /// ライフサイクル管理のユースケース
    lifecycle: Arc<ServerLifecycle>,
}

impl ControlFacade {
    pub fn new(lifecycle: Arc<ServerLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn from_config(config: LifecycleConfig) -> Self {
        Self::new(Arc::new(ServerLifecycle::new(config)))
    }

    pub fn lifecycle(&self) -> &Arc<ServerLifecycle> {
        &self.lifecycle
    }

    /// Start the server with the given password.
    pub async fn start_server(&self, request: StartServerRequest) -> Result<(), ControlError> {
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move { lifecycle.start(request.password).await }).await??;
        Ok(())
    }

    /// Stop the server.
    pub async fn stop_server(&self) -> Result<(), ControlError> {
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move { lifecycle.stop().await }).await??;
        Ok(())
    }

    /// Current status. Never fails for a reachable server.
    pub async fn get_server_status(&self) -> Result<ServerStatusDto, ControlError> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let snapshot = tokio::spawn(async move { lifecycle.status().await }).await?;
        let now = Timestamp::new(self.lifecycle.clock().now_millis());
        Ok(ServerStatusDto::from_snapshot(snapshot, now))
    }

    /// Broadcast a message to every admitted peer.
    pub async fn broadcast_message_command(
        &self,
        request: BroadcastMessageRequest,
    ) -> Result<BroadcastResultDto, ControlError> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let result =
            tokio::spawn(async move { lifecycle.broadcast(request.message.as_bytes()).await })
                .await??;
        Ok(result.into())
    }

    /// 終了時の後始末
    ///
    /// Stop the server if it is active. Used on process teardown.
    pub async fn shutdown(&self) {
        match self.stop_server().await {
            Ok(()) => tracing::info!("Broadcast server stopped on shutdown"),
            Err(e) if e.code == ErrorCode::NotActive => {}
            Err(e) => tracing::warn!("Failed to stop broadcast server on shutdown: {}", e),
        }
    }
}
