//! Control boundary: facade, HTTP control API and its server.

pub mod facade;
mod handler;
mod server;
mod signal;
pub mod state;

pub use facade::{ControlError, ControlFacade};
pub use server::ControlServer;
pub use signal::shutdown_signal;
