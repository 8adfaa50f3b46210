use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::messages::Envelope;
use super::types::{OutboundMessage, PeerId, RoomId, SignalingError};

/// Frames that may wait for one peer's socket before further sends to it fail.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// One connected client.
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    /// Channel for outbound messages to this peer.
    /// Uses OutboundMessage (Utf8Bytes) for O(1) broadcast cloning.
    /// Bounded, so a stalled socket costs at most its own backlog.
    outbound: mpsc::Sender<OutboundMessage>,
    /// Room this peer believes it is in. Changed only under the registry
    /// lock, in step with the room's member map.
    room: Mutex<Option<RoomId>>,
}

impl Peer {
    pub fn new(id: PeerId, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id,
            outbound,
            room: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Serialize `envelope` and queue it for this peer.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SignalingError> {
        let msg = envelope.to_outbound()?;
        self.deliver(msg)
    }

    /// Queue an already serialized frame. Never waits: a full queue drops
    /// the frame for this peer only.
    pub(crate) fn deliver(&self, msg: OutboundMessage) -> Result<(), SignalingError> {
        debug!("-> {}: {}", self.id, msg.as_str());
        self.outbound.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SignalingError::Backlogged(self.id.clone()),
            TrySendError::Closed(_) => SignalingError::Delivery(self.id.clone()),
        })
    }

    pub async fn room(&self) -> Option<RoomId> {
        self.room.lock().await.clone()
    }

    /// Replace the current room, returning the previous one.
    pub(crate) async fn set_room(&self, room: Option<RoomId>) -> Option<RoomId> {
        std::mem::replace(&mut *self.room.lock().await, room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::messages::MessageKind;

    #[tokio::test]
    async fn new_peer_has_no_room() {
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let peer = Peer::new(PeerId::from("alice"), tx);
        assert_eq!(peer.id().as_str(), "alice");
        assert_eq!(peer.room().await, None);
    }

    #[tokio::test]
    async fn set_room_returns_previous() {
        let (tx, _rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let peer = Peer::new(PeerId::from("alice"), tx);
        assert_eq!(peer.set_room(Some(RoomId::from("a"))).await, None);
        assert_eq!(
            peer.set_room(Some(RoomId::from("b"))).await,
            Some(RoomId::from("a"))
        );
        assert_eq!(peer.room().await, Some(RoomId::from("b")));
    }

    #[test]
    fn send_queues_serialized_frame() {
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let peer = Peer::new(PeerId::from("alice"), tx);
        peer.send(&Envelope::peer_joined(PeerId::from("bob"), RoomId::from("lobby")))
            .unwrap();

        let frame = rx.try_recv().unwrap();
        let envelope = Envelope::parse(frame.as_str()).unwrap();
        assert_eq!(envelope.kind, MessageKind::PeerJoined);
        assert_eq!(envelope.from.as_str(), "bob");
    }

    #[test]
    fn send_to_closed_channel_fails() {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        drop(rx);
        let peer = Peer::new(PeerId::from("alice"), tx);
        let err = peer
            .send(&Envelope::new(MessageKind::Leave))
            .unwrap_err();
        assert!(matches!(err, SignalingError::Delivery(id) if id.as_str() == "alice"));
    }

    #[test]
    fn send_to_full_queue_is_backlogged() {
        let (tx, mut rx) = mpsc::channel(2);
        let peer = Peer::new(PeerId::from("alice"), tx);
        let msg = Envelope::peer_left(PeerId::from("bob"), RoomId::from("lobby"));
        peer.send(&msg).unwrap();
        peer.send(&msg).unwrap();

        let err = peer.send(&msg).unwrap_err();
        assert!(matches!(err, SignalingError::Backlogged(id) if id.as_str() == "alice"));

        // Draining makes room again.
        rx.try_recv().unwrap();
        peer.send(&msg).unwrap();
    }
}
