//! PeerTransport trait 定義
//!
//! The domain needs to write to a peer and to close it; how the bytes travel
//! is decided by the infrastructure layer (TCP today).

use async_trait::async_trait;

use super::TransportError;

/// Write side of one peer connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver one encoded payload to the peer as one line. `message` holds
    /// no line terminator.
    async fn send(&self, message: &[u8]) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self);
}
