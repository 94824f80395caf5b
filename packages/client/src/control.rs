//! Client of the control API.

use clipcast_server::infrastructure::dto::http::{
    BroadcastMessageRequest, BroadcastResultDto, ErrorResponse, ServerStatusDto,
    StartServerRequest,
};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// Default base URL of the control API.
pub const DEFAULT_CONTROL_URL: &str = "http://127.0.0.1:21220";

/// Calls the four control operations of a `clipcast-server`.
#[derive(Debug, Clone)]
pub struct ControlClient {
    base_url: String,
    http: reqwest::Client,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn start(&self, password: &str) -> Result<(), ClientError> {
        let request = StartServerRequest {
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/server/start"))
            .json(&request)
            .send()
            .await?;
        check(response).await.map(drop)
    }

    pub async fn stop(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.url("/api/server/stop")).send().await?;
        check(response).await.map(drop)
    }

    pub async fn status(&self) -> Result<ServerStatusDto, ClientError> {
        let response = self.http.get(self.url("/api/server/status")).send().await?;
        json(response).await
    }

    pub async fn broadcast(&self, message: &str) -> Result<BroadcastResultDto, ClientError> {
        let request = BroadcastMessageRequest {
            message: message.to_string(),
        };
        let response = self
            .http
            .post(self.url("/api/server/broadcast"))
            .json(&request)
            .send()
            .await?;
        json(response).await
    }
}

/// Turn an error body into `ClientError::Rejected`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => Err(ClientError::Rejected {
            code: body.code,
            message: body.message,
        }),
        Err(e) => {
            tracing::debug!("Unreadable error body for {}: {}", status, e);
            Err(ClientError::Http(e))
        }
    }
}

async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json::<T>().await?)
}
