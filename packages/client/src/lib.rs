//! Client side of Clipcast.
//!
//! - `control`: calls the control API of a running `clipcast-server`
//! - `peer`: joins a started broadcast server and receives its broadcasts

pub mod control;
pub mod error;
pub mod peer;

pub use control::ControlClient;
pub use error::ClientError;
pub use peer::{ReconnectPolicy, run_peer, run_peer_session};
