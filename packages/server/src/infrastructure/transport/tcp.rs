//! TCP implementation of `PeerTransport`.
//!
//! The read half of the socket stays with the per-peer task in the listener;
//! this type owns the write half. Every write is bounded by a timeout so that
//! a peer which stops reading cannot stall a broadcast. Closing the transport
//! also wakes that task through [`TcpPeerTransport::closed`], so an evicted
//! peer does not linger until the remote side hangs up.

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use clipcast_shared::protocol::frame_line;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::tcp::OwnedWriteHalf,
    sync::{Mutex, watch},
};

use crate::domain::{PeerTransport, TransportError};

/// Line-framed writer for one peer.
pub struct TcpPeerTransport<W = OwnedWriteHalf> {
    remote_addr: SocketAddr,
    /// `None` once closed.
    writer: Mutex<Option<W>>,
    write_timeout: Duration,
    /// Flips to `true` on `close`.
    closed: watch::Sender<bool>,
}

impl<W> TcpPeerTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, remote_addr: SocketAddr, write_timeout: Duration) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            remote_addr,
            writer: Mutex::new(Some(writer)),
            write_timeout,
            closed,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Resolves once `close` has been called, immediately if it already was.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

#[async_trait]
impl<W> PeerTransport for TcpPeerTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: &[u8]) -> Result<(), TransportError> {
        let framed = frame_line(message);
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        let write = async {
            writer.write_all(&framed).await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                tracing::trace!("Wrote {} bytes to {}", framed.len(), self.remote_addr);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn close(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            // Best effort: the peer may already be gone.
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Failed to shut down {}: {}", self.remote_addr, e);
            }
        }
        self.closed.send_replace(true);
    }
}
