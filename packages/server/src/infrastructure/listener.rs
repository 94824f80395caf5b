//! TCP peer listener and admission handshake.
//!
//! One listener task runs per server run. It owns the `TcpListener` and a
//! `JoinSet` with one task per peer, so ending (or aborting) the listener task
//! ends every peer task with it.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use clipcast_shared::protocol::{ADMITTED, DENIED, frame_line, trim_line};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::watch,
    task::JoinSet,
};

use crate::domain::{PeerId, PeerTransport, RegistryError};

use super::transport::TcpPeerTransport;

/// Consecutive accept failures after which the listener gives up.
const MAX_CONSECUTIVE_ACCEPT_ERRORS: u32 = 16;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
/// Longest password line read during admission.
const MAX_ADMISSION_LINE_BYTES: u64 = 4096;
const READ_BUFFER_BYTES: usize = 1024;

/// Admission decisions and registry access for one server run.
///
/// Peer tasks only ever touch the server through this trait.
#[async_trait]
pub trait PeerGate: Send + Sync {
    /// Check the password a peer presented.
    fn verify(&self, password: &str) -> bool;

    /// Register an admitted peer.
    async fn admit(&self, transport: Arc<dyn PeerTransport>) -> Result<PeerId, RegistryError>;

    /// Deregister a peer that went away.
    async fn release(&self, peer_id: PeerId);
}

/// Timeouts applied to each peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerSettings {
    pub admit_timeout: Duration,
    pub write_timeout: Duration,
}

/// The listener could not keep accepting connections.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerError {
    #[error("accept failed repeatedly: {0}")]
    Accept(String),
}

/// Why a peer connection ended.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("admission timed out")]
    AdmissionTimeout,

    #[error("connection closed before admission")]
    ClosedBeforeAdmission,

    #[error("wrong password")]
    Denied,

    #[error("registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accept peers until `shutdown` fires or the sender is dropped.
///
/// # Errors
///
/// Returns `ListenerError::Accept` after `MAX_CONSECUTIVE_ACCEPT_ERRORS`
/// accept failures in a row. Every peer task has ended when this returns.
pub async fn run_listener<G>(
    listener: TcpListener,
    gate: Arc<G>,
    settings: PeerSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ListenerError>
where
    G: PeerGate + 'static,
{
    let mut peers = JoinSet::new();
    let mut consecutive_errors = 0u32;

    let result = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("Listener received shutdown, ending {} peer tasks", peers.len());
                break Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    consecutive_errors = 0;
                    tracing::debug!("Accepted connection from {}", addr);
                    let gate = Arc::clone(&gate);
                    peers.spawn(async move {
                        match serve_peer(stream, addr, gate, settings).await {
                            Ok(()) => {}
                            Err(PeerError::Registry(RegistryError::DuplicateId(id))) => {
                                tracing::error!(
                                    "Registry already holds peer '{}', dropping connection from {}",
                                    id,
                                    addr
                                );
                            }
                            Err(e) => tracing::debug!("Peer connection from {} ended: {}", addr, e),
                        }
                    });
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        "Failed to accept connection ({}/{}): {}",
                        consecutive_errors,
                        MAX_CONSECUTIVE_ACCEPT_ERRORS,
                        e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ACCEPT_ERRORS {
                        break Err(ListenerError::Accept(e.to_string()));
                    }
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = peers.join_next(), if !peers.is_empty() => {}
        }
    };

    peers.shutdown().await;
    result
}

/// Run the admission handshake, then hold the peer until it disconnects.
async fn serve_peer<G>(
    stream: TcpStream,
    addr: SocketAddr,
    gate: Arc<G>,
    settings: PeerSettings,
) -> Result<(), PeerError>
where
    G: PeerGate + ?Sized,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // Raw bytes, so a line that is not UTF-8 is denied like any wrong password.
    let mut line = Vec::new();
    let mut limited = (&mut reader).take(MAX_ADMISSION_LINE_BYTES);
    let read = tokio::time::timeout(
        settings.admit_timeout,
        limited.read_until(b'\n', &mut line),
    )
    .await
    .map_err(|_| PeerError::AdmissionTimeout)??;
    if read == 0 {
        return Err(PeerError::ClosedBeforeAdmission);
    }

    let password = String::from_utf8_lossy(&line);
    if !gate.verify(trim_line(&password)) {
        tracing::warn!("Peer from {} presented a wrong password", addr);
        reply_and_close(&mut write_half, DENIED, settings.write_timeout).await;
        return Err(PeerError::Denied);
    }

    let ack = frame_line(ADMITTED.as_bytes());
    tokio::time::timeout(settings.write_timeout, write_half.write_all(&ack))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;

    let transport = Arc::new(TcpPeerTransport::new(
        write_half,
        addr,
        settings.write_timeout,
    ));
    let peer_id = match gate.admit(transport.clone()).await {
        Ok(id) => id,
        Err(e) => {
            transport.close().await;
            return Err(e.into());
        }
    };
    tracing::info!("Peer '{}' admitted from {}", peer_id, addr);

    // Ends on EOF, or as soon as the server closes the transport (stop or
    // eviction after a failed delivery).
    let result = tokio::select! {
        result = discard_input(&mut reader, peer_id) => result,
        _ = transport.closed() => {
            tracing::debug!("Peer '{}' was closed by the server", peer_id);
            Ok(())
        }
    };

    gate.release(peer_id).await;
    tracing::info!("Peer '{}' disconnected", peer_id);
    result
}

/// Peers are receive-only; input is read and discarded until EOF.
async fn discard_input<R>(reader: &mut R, peer_id: PeerId) -> Result<(), PeerError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => tracing::trace!("Discarding {} bytes from peer '{}'", n, peer_id),
            Err(e) => return Err(PeerError::Io(e)),
        }
    }
}

async fn reply_and_close(writer: &mut OwnedWriteHalf, reply: &str, write_timeout: Duration) {
    let framed = frame_line(reply.as_bytes());
    let finish = async {
        writer.write_all(&framed).await?;
        writer.shutdown().await
    };
    if let Ok(Err(e)) = tokio::time::timeout(write_timeout, finish).await {
        tracing::debug!("Failed to send '{}' reply: {}", reply, e);
    }
}
