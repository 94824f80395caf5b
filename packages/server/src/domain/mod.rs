//! Domain model: peers, server state and the seams to transports and clipboards.

pub mod clipboard;
pub mod entity;
pub mod error;
pub mod transport;
pub mod value_object;

pub use clipboard::ClipboardSource;
#[cfg(test)]
pub use clipboard::MockClipboardSource;
pub use entity::{
    BroadcastResult, DeliveryFailure, Fault, PeerConnection, ServerState, StatusSnapshot,
};
pub use error::{
    BroadcastError, ClipboardError, RegistryError, StartError, StopError, TransportError,
};
pub use transport::PeerTransport;
#[cfg(test)]
pub use transport::MockPeerTransport;
pub use value_object::{Credential, PeerId, Timestamp};
