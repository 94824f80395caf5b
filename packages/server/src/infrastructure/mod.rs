//! Infrastructure layer: peer bookkeeping, TCP plumbing and boundary DTOs.

#[cfg(feature = "clipboard")]
pub mod clipboard;
pub mod dto;
pub mod listener;
pub mod registry;
pub mod transport;

pub use registry::ConnectionRegistry;

#[cfg(feature = "clipboard")]
pub use clipboard::SystemClipboard;
