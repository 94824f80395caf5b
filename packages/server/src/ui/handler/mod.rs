//! HTTP handlers of the control API.

mod http;

pub use http::{broadcast_message, get_server_status, health_check, start_server, stop_server};
