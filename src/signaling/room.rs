use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use super::messages::Envelope;
use super::peer::Peer;
use super::types::{PeerId, RoomId, SignalingError};

/// A named group of peers that can signal each other.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: RwLock<HashMap<PeerId, Arc<Peer>>>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Insert `peer`, replacing any entry with the same id. Returns the
    /// replaced peer, if any.
    pub async fn add_member(&self, peer: Arc<Peer>) -> Option<Arc<Peer>> {
        self.members.write().await.insert(peer.id().clone(), peer)
    }

    pub async fn remove_member(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.members.write().await.remove(id)
    }

    /// Remove `peer` only if its entry has not been taken over by a newer
    /// connection with the same id.
    pub(crate) async fn remove_peer(&self, peer: &Arc<Peer>) -> bool {
        let mut members = self.members.write().await;
        match members.get(peer.id()) {
            Some(current) if Arc::ptr_eq(current, peer) => {
                members.remove(peer.id());
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current member ids, in no particular order.
    pub async fn member_ids(&self) -> Vec<PeerId> {
        self.members.read().await.keys().cloned().collect()
    }

    pub async fn get_member(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.members.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// Send `envelope` to every member except `exclude`.
    ///
    /// The frame is serialized once. A member whose channel is gone or full is logged
    /// and skipped. Returns how many members the frame was queued for.
    pub async fn broadcast(
        &self,
        envelope: &Envelope,
        exclude: Option<&PeerId>,
    ) -> Result<usize, SignalingError> {
        let msg = envelope.to_outbound()?;
        let members = self.members.read().await;

        let mut delivered = 0;
        for (id, peer) in members.iter() {
            if Some(id) == exclude {
                continue;
            }
            match peer.deliver(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast in room {}: {}", self.id, e),
            }
        }
        Ok(delivered)
    }
}
