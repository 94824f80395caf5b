//! Command line arguments and runtime configuration.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use clipcast_shared::protocol::{DEFAULT_CONTROL_ADDR, DEFAULT_PEER_ADDR};

/// 1 MiB
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_ADMIT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_CLIPBOARD_INTERVAL_MS: u64 = 1000;

/// CLI arguments for the broadcast server.
#[derive(Parser, Debug, Clone)]
#[command(name = "clipcast-server")]
#[command(about = "Local broadcast server controlled over a loopback HTTP API", long_about = None)]
#[command(version)]
pub struct Args {
    /// Address of the control API
    #[arg(long, default_value = DEFAULT_CONTROL_ADDR, env = "CLIPCAST_CONTROL_ADDR")]
    pub control_addr: SocketAddr,

    /// Address peers connect to once the server is started
    #[arg(long, default_value = DEFAULT_PEER_ADDR, env = "CLIPCAST_PEER_ADDR")]
    pub peer_addr: SocketAddr,

    /// Largest message accepted for broadcast, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_BYTES, env = "CLIPCAST_MAX_MESSAGE_BYTES")]
    pub max_message_bytes: usize,

    /// Seconds a peer has to present the password
    #[arg(long, default_value_t = DEFAULT_ADMIT_TIMEOUT_SECS, env = "CLIPCAST_ADMIT_TIMEOUT")]
    pub admit_timeout: u64,

    /// Seconds a single write to a peer may take
    #[arg(long, default_value_t = DEFAULT_WRITE_TIMEOUT_SECS, env = "CLIPCAST_WRITE_TIMEOUT")]
    pub write_timeout: u64,

    /// Seconds stop waits for peers and the listener before forcing them closed
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS, env = "CLIPCAST_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,

    /// Broadcast the system clipboard whenever it changes while the server runs
    /// (needs the `clipboard` feature)
    #[arg(long, env = "CLIPCAST_SHARE_CLIPBOARD")]
    pub share_clipboard: bool,

    /// Milliseconds between two clipboard polls
    #[arg(long, default_value_t = DEFAULT_CLIPBOARD_INTERVAL_MS, env = "CLIPCAST_CLIPBOARD_INTERVAL_MS")]
    pub clipboard_interval_ms: u64,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub control_addr: SocketAddr,
    /// Attach the system clipboard to the lifecycle.
    pub share_clipboard: bool,
    pub lifecycle: LifecycleConfig,
}

/// Settings of one broadcast server lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Address the peer listener binds on start.
    pub peer_addr: SocketAddr,
    pub max_message_bytes: usize,
    pub admit_timeout: Duration,
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Poll interval of the clipboard monitor, when a clipboard is attached.
    pub clipboard_interval: Duration,
}

impl LifecycleConfig {
    /// Defaults with a different peer address; handy for ephemeral ports.
    pub fn with_peer_addr(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            ..Self::default()
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 21221)),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            admit_timeout: Duration::from_secs(DEFAULT_ADMIT_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            clipboard_interval: Duration::from_millis(DEFAULT_CLIPBOARD_INTERVAL_MS),
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            control_addr: args.control_addr,
            share_clipboard: args.share_clipboard,
            lifecycle: LifecycleConfig {
                peer_addr: args.peer_addr,
                max_message_bytes: args.max_message_bytes,
                admit_timeout: Duration::from_secs(args.admit_timeout),
                write_timeout: Duration::from_secs(args.write_timeout),
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
                clipboard_interval: Duration::from_millis(args.clipboard_interval_ms),
            },
        }
    }
}
