//! Local broadcast server.
//!
//! Serves the control API; the broadcast server itself is started and stopped
//! through it.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin clipcast-server
//! cargo run --bin clipcast-server -- --control-addr 127.0.0.1:21220 --peer-addr 127.0.0.1:21221
//! cargo run --features clipboard --bin clipcast-server -- --share-clipboard
//! ```

use std::sync::Arc;

use clap::Parser;
use clipcast_server::{
    config::{Args, ServerConfig},
    ui::{ControlFacade, ControlServer},
    usecase::ServerLifecycle,
};
use clipcast_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let config = ServerConfig::from(args);

    // 1. Lifecycle (with the clipboard monitor if requested)
    // 2. Facade
    // 3. Control server
    let mut lifecycle = ServerLifecycle::new(config.lifecycle);
    if config.share_clipboard {
        lifecycle = attach_clipboard(lifecycle);
    }
    let facade = ControlFacade::new(Arc::new(lifecycle));
    let server = ControlServer::new(facade.clone());

    let result = server.run(config.control_addr).await;

    // Peers and the listener must not outlive the process
    facade.shutdown().await;

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "clipboard")]
fn attach_clipboard(lifecycle: ServerLifecycle) -> ServerLifecycle {
    tracing::info!("Sharing the system clipboard while the server runs");
    lifecycle.with_clipboard(Arc::new(clipcast_server::infrastructure::SystemClipboard))
}

#[cfg(not(feature = "clipboard"))]
fn attach_clipboard(_lifecycle: ServerLifecycle) -> ServerLifecycle {
    tracing::error!("--share-clipboard needs a build with the `clipboard` feature");
    std::process::exit(2);
}
