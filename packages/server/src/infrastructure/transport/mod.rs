//! Peer transport implementations.
//!
//! - `tcp`: line-framed writes over a TCP write half

pub mod tcp;

pub use tcp::TcpPeerTransport;
