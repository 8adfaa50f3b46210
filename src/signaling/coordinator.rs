use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::messages::{Envelope, MessageKind};
use super::peer::Peer;
use super::room::Room;
use super::types::{RoomId, SignalingError};

/// How a peer enters a room. A reconnecting peer is assumed to be known to
/// the others already, so nobody is told about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Join,
    Reconnect,
}

impl Admission {
    fn kind(self) -> MessageKind {
        match self {
            Admission::Join => MessageKind::Join,
            Admission::Reconnect => MessageKind::Reconnect,
        }
    }
}

/// Owns every room and routes each inbound message.
///
/// Lock order is always registry, then room, then the peer's own room slot.
#[derive(Debug, Default)]
pub struct Coordinator {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room named `id`, creating and registering it if needed.
    pub async fn get_or_create_room(&self, id: &RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        room_entry(&mut rooms, id)
    }

    /// Look up an existing room without creating it.
    pub async fn room(&self, id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Route one message from `peer`.
    ///
    /// Errors describe why the message was dropped; the caller logs them and
    /// keeps the connection open.
    pub async fn dispatch(
        &self,
        peer: &Arc<Peer>,
        envelope: Envelope,
    ) -> Result<(), SignalingError> {
        debug!(
            "<- {}: type={}, room={}, target={}",
            peer.id(),
            envelope.kind,
            envelope.room,
            envelope.target
        );

        let kind = envelope.kind.clone();
        match kind {
            MessageKind::Join => self.admit(peer, envelope.room, Admission::Join).await,
            MessageKind::Reconnect => {
                self.admit(peer, envelope.room, Admission::Reconnect).await
            }
            MessageKind::Leave => self.leave(peer).await,
            MessageKind::Offer | MessageKind::Answer | MessageKind::IceCandidate => {
                self.relay(peer, envelope).await
            }
            MessageKind::Peers
            | MessageKind::PeerJoined
            | MessageKind::ReconnectPeers
            | MessageKind::PeerLeft
            | MessageKind::Unknown(_) => Err(SignalingError::UnexpectedType(kind)),
        }
    }

    /// Clean up after a connection that went away without sending `leave`.
    /// The remaining members are not told.
    pub async fn disconnect(&self, peer: &Arc<Peer>) {
        if let Some(room) = self.detach(peer).await {
            info!("Peer {} dropped out of room {}", peer.id(), room.id());
        }
    }

    async fn admit(
        &self,
        peer: &Arc<Peer>,
        room_id: RoomId,
        admission: Admission,
    ) -> Result<(), SignalingError> {
        if room_id.is_empty() {
            return Err(SignalingError::MissingField {
                kind: admission.kind(),
                field: "room",
            });
        }

        // A peer lives in one room at a time; moving counts as leaving.
        if let Some(current) = peer.room().await {
            if current != room_id {
                self.leave(peer).await?;
            }
        }

        let (room, others) = {
            let mut rooms = self.rooms.write().await;
            let room = room_entry(&mut rooms, &room_id);
            if let Some(previous) = room.add_member(Arc::clone(peer)).await {
                if !Arc::ptr_eq(&previous, peer) {
                    // The old connection no longer has a seat anywhere.
                    previous.set_room(None).await;
                    info!("Peer {} replaced a stale connection in room {}", peer.id(), room_id);
                }
            }
            peer.set_room(Some(room_id.clone())).await;

            let others: Vec<_> = room
                .member_ids()
                .await
                .into_iter()
                .filter(|id| id != peer.id())
                .collect();
            (room, others)
        };

        let reply = match admission {
            Admission::Join => Envelope::peers(room_id.clone(), others)?,
            Admission::Reconnect => Envelope::reconnect_peers(room_id.clone(), others)?,
        };
        if let Err(e) = peer.send(&reply) {
            warn!("Could not send {} to {}: {}", reply.kind, peer.id(), e);
        }

        match admission {
            Admission::Join => {
                let joined = Envelope::peer_joined(peer.id().clone(), room_id.clone());
                room.broadcast(&joined, Some(peer.id())).await?;
                info!("Peer {} joined room {}", peer.id(), room_id);
            }
            Admission::Reconnect => {
                info!("Peer {} reconnected to room {}", peer.id(), room_id);
            }
        }
        Ok(())
    }

    async fn leave(&self, peer: &Arc<Peer>) -> Result<(), SignalingError> {
        let Some(room) = self.detach(peer).await else {
            debug!("Peer {} is not in a room, nothing to leave", peer.id());
            return Ok(());
        };

        let left = Envelope::peer_left(peer.id().clone(), room.id().clone());
        room.broadcast(&left, Some(peer.id())).await?;
        info!("Peer {} left room {}", peer.id(), room.id());
        Ok(())
    }

    /// Take `peer` out of its room, dropping the room once it is empty.
    /// Returns the room it was removed from.
    async fn detach(&self, peer: &Arc<Peer>) -> Option<Arc<Room>> {
        let room_id = peer.room().await?;

        let mut rooms = self.rooms.write().await;
        peer.set_room(None).await;

        let Some(room) = rooms.get(&room_id).cloned() else {
            debug!("Room {} of peer {} is already gone", room_id, peer.id());
            return None;
        };
        if !room.remove_peer(peer).await {
            debug!(
                "Peer {} in room {} belongs to a newer connection, keeping it",
                peer.id(),
                room_id
            );
            return None;
        }
        if room.is_empty().await {
            rooms.remove(&room_id);
            info!("Room {} removed (empty)", room_id);
        }
        Some(room)
    }

    async fn relay(&self, peer: &Arc<Peer>, mut envelope: Envelope) -> Result<(), SignalingError> {
        if envelope.target.is_empty() {
            return Err(SignalingError::MissingField {
                kind: envelope.kind,
                field: "target",
            });
        }

        let room = self
            .room(&envelope.room)
            .await
            .ok_or_else(|| SignalingError::RoomNotFound(envelope.room.clone()))?;
        let target = room
            .get_member(&envelope.target)
            .await
            .ok_or_else(|| SignalingError::PeerNotFound {
                room: envelope.room.clone(),
                peer: envelope.target.clone(),
            })?;

        envelope.from = peer.id().clone();
        target.send(&envelope)?;
        debug!(
            "Relayed {} from {} to {} in room {}",
            envelope.kind,
            peer.id(),
            envelope.target,
            envelope.room
        );
        Ok(())
    }
}

/// The single place rooms are created.
fn room_entry(rooms: &mut HashMap<RoomId, Arc<Room>>, id: &RoomId) -> Arc<Room> {
    Arc::clone(rooms.entry(id.clone()).or_insert_with(|| {
        info!("Room created: {}", id);
        Arc::new(Room::new(id.clone()))
    }))
}
