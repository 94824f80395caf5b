//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    infrastructure::dto::http::{
        BroadcastMessageRequest, BroadcastResultDto, ErrorCode, ErrorResponse, ServerStatusDto,
        StartServerRequest,
    },
    ui::{facade::ControlError, state::AppState},
};

/// エラーコードごとの HTTP ステータス
fn status_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::AlreadyActive | ErrorCode::NotActive | ErrorCode::NotRunning => {
            StatusCode::CONFLICT
        }
        ErrorCode::BindFailed => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::MessageTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JsonRejection> for ControlError {
    fn from(rejection: JsonRejection) -> Self {
        let code = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ErrorCode::MessageTooLarge
        } else {
            ErrorCode::InvalidRequest
        };
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        Self::new(code, rejection.body_text())
    }
}

/// JSON ボディの extractor（拒否時も `{code, message}` 形式で返す）
///
/// `Json` extractor whose rejections use the `{code, message}` error body.
/// A body over the limit maps to `message_too_large`, anything else that is
/// not the expected JSON to `invalid_request`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ControlError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = status_code(self.code);
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

/// ヘルスチェック
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// ブロードキャストサーバーの起動
pub async fn start_server(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<StartServerRequest>,
) -> Result<StatusCode, ControlError> {
    state.facade.start_server(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// ブロードキャストサーバーの停止
pub async fn stop_server(State(state): State<Arc<AppState>>) -> Result<StatusCode, ControlError> {
    state.facade.stop_server().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 状態の取得
pub async fn get_server_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ServerStatusDto>, ControlError> {
    let status = state.facade.get_server_status().await?;
    Ok(Json(status))
}

/// Broadcast a message to every connected peer
pub async fn broadcast_message(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<BroadcastMessageRequest>,
) -> Result<Json<BroadcastResultDto>, ControlError> {
    let result = state.facade.broadcast_message_command(request).await?;
    Ok(Json(result))
}
