//! Peer client: joins a broadcast server and receives its broadcasts.

use std::time::Duration;

use clipcast_shared::protocol::{ADMITTED, BroadcastPayload, DENIED, trim_line};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::error::ClientError;

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// How often and how fast `run_peer` reconnects after losing the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            interval: Duration::from_secs(RECONNECT_INTERVAL_SECS),
        }
    }
}

/// Run one peer session: connect, present the password, then hand every
/// received broadcast to `on_message` until the connection ends.
///
/// Returns `Ok(())` when an admitted session ends because the connection was
/// closed or broke. Lines that are not a valid payload are logged and skipped.
///
/// # Errors
///
/// - `ClientError::Denied` if the server rejected the password.
/// - `ClientError::Connection` if the server could not be reached or answered
///   something other than the admission reply.
pub async fn run_peer_session<F>(
    addr: &str,
    password: &str,
    on_message: &mut F,
) -> Result<(), ClientError>
where
    F: FnMut(BroadcastPayload),
{
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ClientError::Connection(format!("{}: {}", addr, e)))?;
    stream
        .write_all(format!("{}\n", password).as_bytes())
        .await?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(ClientError::Connection(
            "server closed the connection before replying".to_string(),
        ));
    }
    match trim_line(&line) {
        ADMITTED => {}
        DENIED => return Err(ClientError::Denied),
        other => {
            return Err(ClientError::Connection(format!(
                "unexpected reply '{}'",
                other
            )));
        }
    }
    tracing::info!("Connected to broadcast server at {}", addr);

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                tracing::info!("Server closed the connection");
                return Ok(());
            }
            Ok(_) => match BroadcastPayload::decode(&line) {
                Ok(payload) => on_message(payload),
                Err(e) => tracing::warn!("Skipping malformed broadcast: {}", e),
            },
            Err(e) => {
                tracing::warn!("Read error: {}", e);
                return Ok(());
            }
        }
    }
}

/// Run a peer with reconnection logic.
///
/// A denied password ends immediately. Any other failure is retried
/// according to `policy`; the attempt counter starts over after each
/// admitted session.
pub async fn run_peer<F>(
    addr: &str,
    password: &str,
    policy: ReconnectPolicy,
    mut on_message: F,
) -> Result<(), ClientError>
where
    F: FnMut(BroadcastPayload),
{
    let mut attempts = 0;

    loop {
        tracing::info!(
            "Attempting to connect to {} (attempt {}/{})",
            addr,
            attempts + 1,
            policy.max_attempts
        );

        match run_peer_session(addr, password, &mut on_message).await {
            Ok(()) => {
                tracing::warn!("Connection lost");
                attempts = 0;
            }
            Err(ClientError::Denied) => {
                tracing::error!("Password was denied by {}. Exiting.", addr);
                return Err(ClientError::Denied);
            }
            Err(e) => {
                tracing::warn!("Connection failed: {}", e);
                attempts += 1;
                if attempts >= policy.max_attempts {
                    tracing::error!(
                        "Failed to reconnect after {} attempts. Exiting.",
                        policy.max_attempts
                    );
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Reconnecting in {:?}... (attempt {}/{})",
            policy.interval,
            attempts + 1,
            policy.max_attempts
        );
        tokio::time::sleep(policy.interval).await;
    }
}
