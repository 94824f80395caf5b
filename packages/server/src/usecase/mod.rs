//! UseCase layer: lifecycle control, message fan-out and clipboard monitoring.

pub mod broadcast;
pub mod clipboard;
pub mod lifecycle;

pub use broadcast::BroadcastChannel;
pub use clipboard::ClipboardMonitor;
pub use lifecycle::ServerLifecycle;
