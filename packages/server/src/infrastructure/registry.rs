//! Authoritative set of admitted peers.
//!
//! The registry is a plain in-memory structure; the lifecycle guards it with
//! its own lock, together with the server state it must agree with.

use std::collections::HashMap;

use crate::domain::{PeerConnection, PeerId, RegistryError};

/// Insertion-ordered map of peer id to connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: HashMap<PeerId, PeerConnection>,
    /// Registration order, used for deterministic broadcast order.
    order: Vec<PeerId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer.
    ///
    /// # Errors
    ///
    /// `RegistryError::DuplicateId` if the id is already present. Ids are
    /// random UUIDs, so this indicates a bug in whoever allocated the id.
    pub fn register(&mut self, peer: PeerConnection) -> Result<(), RegistryError> {
        if self.peers.contains_key(&peer.id) {
            return Err(RegistryError::DuplicateId(peer.id));
        }
        self.order.push(peer.id);
        self.peers.insert(peer.id, peer);
        Ok(())
    }

    /// Remove a peer. Unknown ids are ignored, since disconnects race with
    /// stops and evictions.
    pub fn deregister(&mut self, peer_id: &PeerId) -> Option<PeerConnection> {
        let removed = self.peers.remove(peer_id)?;
        self.order.retain(|id| id != peer_id);
        Some(removed)
    }

    /// Point-in-time copy of every peer, in registration order.
    pub fn snapshot(&self) -> Vec<PeerConnection> {
        self.order
            .iter()
            .filter_map(|id| self.peers.get(id))
            .cloned()
            .collect()
    }

    /// Remove and return every peer, in registration order.
    pub fn drain(&mut self) -> Vec<PeerConnection> {
        let order = std::mem::take(&mut self.order);
        let mut peers = std::mem::take(&mut self.peers);
        order.iter().filter_map(|id| peers.remove(id)).collect()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
