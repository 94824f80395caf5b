//! Line protocol spoken between the broadcast server and its peers.
//!
//! A peer opens a TCP connection and sends the server password as one line.
//! The server answers with [`ADMITTED`] or [`DENIED`]. After admission every
//! broadcast arrives as one line holding a JSON encoded [`BroadcastPayload`],
//! e.g. `{"type":"text","data":"hello"}`. JSON escaping keeps line breaks of
//! the content off the wire, so one broadcast is always exactly one line.

use serde::{Deserialize, Serialize};

/// Default control API address.
pub const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:21220";

/// Default address peers connect to.
pub const DEFAULT_PEER_ADDR: &str = "127.0.0.1:21221";

/// Reply sent to a peer whose password matched.
pub const ADMITTED: &str = "ok";

/// Reply sent to a peer whose password did not match.
pub const DENIED: &str = "denied";

/// Strip the line terminator (`\n` or `\r\n`) from a received line.
pub fn trim_line(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

/// Append the line terminator to a payload.
pub fn frame_line(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(b'\n');
    framed
}

/// Content of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum BroadcastPayload {
    Text(String),
    /// PNG image, base64 encoded.
    Image(String),
}

impl BroadcastPayload {
    /// Text payload from raw message bytes. Invalid UTF-8 sequences are
    /// replaced with U+FFFD.
    pub fn text(message: &[u8]) -> Self {
        Self::Text(String::from_utf8_lossy(message).into_owned())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Text(data) | Self::Image(data) => data,
        }
    }

    /// JSON form without the line terminator. Never contains a raw `\n`.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse one received line, with or without its terminator.
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(trim_line(line))
    }
}
