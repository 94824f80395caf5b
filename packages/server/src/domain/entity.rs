//! Entities of the broadcast domain.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::{Deserialize, Serialize};

use super::{PeerId, PeerTransport, Timestamp};

/// Lifecycle state of the broadcast server.
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Idle
///            |           |
///            v           v
///         Faulted <------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Faulted,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Faulted => "faulted",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the server is in [`ServerState::Faulted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The listening endpoint could not be bound. `start` may be retried.
    Bind(String),
    /// The listener failed while running. `stop` must run before the next `start`.
    Transport(String),
}

impl Fault {
    /// Whether a new `start` is accepted without an intervening `stop`.
    pub fn allows_restart(&self) -> bool {
        matches!(self, Self::Bind(_))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(reason) => write!(f, "bind failed: {}", reason),
            Self::Transport(reason) => write!(f, "transport failed: {}", reason),
        }
    }
}

/// One admitted peer.
///
/// Clones share the transport and the liveness flag, so a registry snapshot
/// observes the same connection as the registry itself.
#[derive(Clone)]
pub struct PeerConnection {
    pub id: PeerId,
    pub connected_at: Timestamp,
    transport: Arc<dyn PeerTransport>,
    alive: Arc<AtomicBool>,
}

impl PeerConnection {
    pub fn new(id: PeerId, transport: Arc<dyn PeerTransport>, connected_at: Timestamp) -> Self {
        Self {
            id,
            connected_at,
            transport,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// A delivery that did not reach its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub peer_id: PeerId,
    pub reason: String,
}

/// Outcome of one broadcast, in snapshot order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub succeeded: Vec<PeerId>,
    pub failed: Vec<DeliveryFailure>,
}

impl BroadcastResult {
    /// Number of peers the broadcast was attempted on.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn failed_ids(&self) -> Vec<PeerId> {
        self.failed.iter().map(|f| f.peer_id).collect()
    }
}

/// Point-in-time view of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ServerState,
    pub peer_count: usize,
    /// Set while `Running`.
    pub started_at: Option<Timestamp>,
    /// Address peers connect to, set while `Running`.
    pub listen_addr: Option<SocketAddr>,
    /// Set while `Faulted`.
    pub fault: Option<Fault>,
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            state: ServerState::Idle,
            peer_count: 0,
            started_at: None,
            listen_addr: None,
            fault: None,
        }
    }

    /// Milliseconds since the server started, if it is running.
    pub fn uptime_millis(&self, now: Timestamp) -> Option<u64> {
        self.started_at.map(|started| started.elapsed_until(now))
    }
}
