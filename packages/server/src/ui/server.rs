//! Control server execution logic.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    facade::ControlFacade,
    handler::{broadcast_message, get_server_status, health_check, start_server, stop_server},
    signal::shutdown_signal,
    state::AppState,
};

/// Room for JSON escaping on top of the raw message size.
const BODY_LIMIT_OVERHEAD: usize = 64 * 1024;

/// 制御 API サーバー
///
/// HTTP control API over a `ControlFacade`.
///
/// # Example
///
/// ```ignore
/// let facade = ControlFacade::from_config(config.lifecycle);
/// let server = ControlServer::new(facade.clone());
/// server.run(config.control_addr).await?;
/// facade.shutdown().await;
/// ```
pub struct ControlServer {
    /// 全ハンドラーが共有するファサード
    facade: ControlFacade,
}

impl ControlServer {
    pub fn new(facade: ControlFacade) -> Self {
        Self { facade }
    }

    /// Routes of the control API.
    pub fn router(&self) -> Router {
        let body_limit = self
            .facade
            .lifecycle()
            .config()
            .max_message_bytes
            .saturating_mul(2)
            .saturating_add(BODY_LIMIT_OVERHEAD);
        let app_state = Arc::new(AppState {
            facade: self.facade.clone(),
        });

        Router::new()
            .route("/api/health", get(health_check))
            .route("/api/server/start", post(start_server))
            .route("/api/server/stop", post(stop_server))
            .route("/api/server/status", get(get_server_status))
            .route("/api/server/broadcast", post(broadcast_message))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Bind `addr` and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the control address cannot be bound or the server
    /// fails while running.
    pub async fn run(self, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Control API listening on http://{}", listener.local_addr()?);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Control API shutdown complete");

        Ok(())
    }
}
