//! Utilities shared by the Clipcast server and client.

pub mod logger;
pub mod protocol;
pub mod time;
