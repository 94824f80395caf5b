//! ClipboardSource trait 定義
//!
//! Where clipboard content comes from is an infrastructure concern (the
//! system clipboard behind the `clipboard` feature, scripted sources in
//! tests).

use clipcast_shared::protocol::BroadcastPayload;

use super::ClipboardError;

/// Read access to a clipboard.
///
/// Reads may block, so callers run them off the async runtime.
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardSource: Send + Sync {
    /// Current content, or `None` when the clipboard holds nothing that can
    /// be broadcast.
    fn read(&self) -> Result<Option<BroadcastPayload>, ClipboardError>;
}
