use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::{RawValue, to_raw_value};

use super::types::{OutboundMessage, PeerId, RoomId};

/// Sender id used on messages the relay itself originates.
pub const SERVER_SENDER: &str = "server";

/// Value of the `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    // client -> server
    Join,
    Leave,
    Reconnect,
    Offer,
    Answer,
    IceCandidate,

    // server -> client
    Peers,
    PeerJoined,
    ReconnectPeers,
    PeerLeft,

    /// Anything else, kept verbatim so it can be logged.
    Unknown(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Reconnect => "reconnect",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::IceCandidate => "ice-candidate",
            MessageKind::Peers => "peers",
            MessageKind::PeerJoined => "peer-joined",
            MessageKind::ReconnectPeers => "reconnect-peers",
            MessageKind::PeerLeft => "peer-left",
            MessageKind::Unknown(other) => other,
        }
    }

    /// Offers, answers and ICE candidates are relayed to a single target.
    pub fn is_signaling(&self) -> bool {
        matches!(
            self,
            MessageKind::Offer | MessageKind::Answer | MessageKind::IceCandidate
        )
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Unknown(String::new())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MessageKind {
    fn from(s: &str) -> Self {
        match s {
            "join" => MessageKind::Join,
            "leave" => MessageKind::Leave,
            "reconnect" => MessageKind::Reconnect,
            "offer" => MessageKind::Offer,
            "answer" => MessageKind::Answer,
            "ice-candidate" => MessageKind::IceCandidate,
            "peers" => MessageKind::Peers,
            "peer-joined" => MessageKind::PeerJoined,
            "reconnect-peers" => MessageKind::ReconnectPeers,
            "peer-left" => MessageKind::PeerLeft,
            other => MessageKind::Unknown(other.to_owned()),
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(MessageKind::from(s.as_str()))
    }
}

/// One signaling frame, in both directions.
///
/// `payload` is kept as raw JSON text so offers, answers and candidates are
/// forwarded byte-for-byte.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,

    #[serde(default, skip_serializing_if = "PeerId::is_empty")]
    pub target: PeerId,

    #[serde(default)]
    pub from: PeerId,

    #[serde(default)]
    pub room: RoomId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

/// Payload of `peers` and `reconnect-peers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<PeerId>,
}

impl Envelope {
    /// A bare message of the given kind, to be filled in with the `with_*` builders.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_room(mut self, room: impl Into<RoomId>) -> Self {
        self.room = room.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<PeerId>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_from(mut self, from: impl Into<PeerId>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_payload(mut self, payload: Box<RawValue>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Reply to a `join`: the other members of the room.
    pub fn peers(room: RoomId, peers: Vec<PeerId>) -> Result<Self, serde_json::Error> {
        Self::peer_list(MessageKind::Peers, room, peers)
    }

    /// Reply to a `reconnect`: the other members of the room.
    pub fn reconnect_peers(room: RoomId, peers: Vec<PeerId>) -> Result<Self, serde_json::Error> {
        Self::peer_list(MessageKind::ReconnectPeers, room, peers)
    }

    fn peer_list(
        kind: MessageKind,
        room: RoomId,
        peers: Vec<PeerId>,
    ) -> Result<Self, serde_json::Error> {
        let payload = to_raw_value(&PeerList { peers })?;
        Ok(Self::new(kind)
            .with_from(SERVER_SENDER)
            .with_room(room)
            .with_payload(payload))
    }

    pub fn peer_joined(from: PeerId, room: RoomId) -> Self {
        Self::new(MessageKind::PeerJoined).with_from(from).with_room(room)
    }

    pub fn peer_left(from: PeerId, room: RoomId) -> Self {
        Self::new(MessageKind::PeerLeft).with_from(from).with_room(room)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }

    /// Decodes the payload of a `peers`/`reconnect-peers` message.
    pub fn peer_list_payload(&self) -> Option<PeerList> {
        let payload = self.payload.as_ref()?;
        serde_json::from_str(payload.get()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_join() {
        let json = r#"{"type": "join", "from": "alice", "room": "lobby"}"#;
        let msg = Envelope::parse(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Join);
        assert_eq!(msg.room.as_str(), "lobby");
        assert!(msg.target.is_empty());
        assert!(msg.payload.is_none());
    }

    #[test]
    fn parse_ice_candidate() {
        let json = r#"{"type":"ice-candidate","target":"bob","from":"alice","room":"lobby","payload":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host"}}"#;
        let msg = Envelope::parse(json).unwrap();
        assert_eq!(msg.kind, MessageKind::IceCandidate);
        assert!(msg.kind.is_signaling());
        assert_eq!(msg.target.as_str(), "bob");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let msg = Envelope::parse("{}").unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown(String::new()));
        assert!(msg.from.is_empty());
        assert!(msg.room.is_empty());
    }

    #[test]
    fn null_target_reads_as_empty() {
        let json = r#"{"type":"join","room":"lobby","from":"alice","target":null}"#;
        let msg = Envelope::parse(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Join);
        assert_eq!(msg.room.as_str(), "lobby");
        assert!(msg.target.is_empty());
    }

    #[test]
    fn null_type_is_unrecognized() {
        let json = r#"{"type":null,"room":null,"from":"alice"}"#;
        let msg = Envelope::parse(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown(String::new()));
        assert!(msg.room.is_empty());
    }

    #[test]
    fn unknown_type_is_kept_verbatim() {
        let msg = Envelope::parse(r#"{"type": "chat", "room": "lobby"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown("chat".to_string()));
        assert_eq!(msg.kind.to_string(), "chat");
    }

    #[test]
    fn payload_is_forwarded_verbatim() {
        let json = r#"{"type":"offer","target":"bob","from":"alice","room":"lobby","payload":{"sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1",  "type":"offer"}}"#;
        let msg = Envelope::parse(json).unwrap();
        let payload = msg.payload.as_ref().unwrap();
        assert_eq!(
            payload.get(),
            r#"{"sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1",  "type":"offer"}"#
        );

        let out = msg.to_outbound().unwrap();
        assert!(out.as_str().contains(payload.get()));
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(Envelope::parse("hello").is_err());
        assert!(Envelope::from_slice(b"{\"type\": ").is_err());
    }

    #[test]
    fn serialize_peers() {
        let msg = Envelope::peers(RoomId::from("lobby"), vec![PeerId::from("alice")]).unwrap();
        let json = msg.to_outbound().unwrap();
        assert_eq!(
            json.as_str(),
            r#"{"type":"peers","from":"server","room":"lobby","payload":{"peers":["alice"]}}"#
        );
    }

    #[test]
    fn serialize_empty_reconnect_peers() {
        let msg = Envelope::reconnect_peers(RoomId::from("lobby"), Vec::new()).unwrap();
        let json = msg.to_outbound().unwrap();
        assert_eq!(
            json.as_str(),
            r#"{"type":"reconnect-peers","from":"server","room":"lobby","payload":{"peers":[]}}"#
        );
    }

    #[test]
    fn serialize_peer_joined_without_payload() {
        let msg = Envelope::peer_joined(PeerId::from("bob"), RoomId::from("lobby"));
        let json = msg.to_outbound().unwrap();
        assert_eq!(
            json.as_str(),
            r#"{"type":"peer-joined","from":"bob","room":"lobby"}"#
        );
    }

    #[test]
    fn serialize_peer_left() {
        let msg = Envelope::peer_left(PeerId::from("bob"), RoomId::from("lobby"));
        let json = msg.to_outbound().unwrap();
        assert!(json.as_str().contains(r#""type":"peer-left""#));
        assert!(json.as_str().contains(r#""from":"bob""#));
    }

    #[test]
    fn peer_list_payload_round_trips() {
        let msg = Envelope::peers(
            RoomId::from("lobby"),
            vec![PeerId::from("alice"), PeerId::from("carol")],
        )
        .unwrap();
        let parsed = Envelope::parse(msg.to_outbound().unwrap().as_str()).unwrap();
        assert_eq!(parsed.kind, MessageKind::Peers);
        assert_eq!(
            parsed.peer_list_payload(),
            Some(PeerList {
                peers: vec![PeerId::from("alice"), PeerId::from("carol")],
            })
        );
    }

    #[test]
    fn kinds_use_wire_names() {
        for name in [
            "join",
            "leave",
            "reconnect",
            "offer",
            "answer",
            "ice-candidate",
            "peers",
            "peer-joined",
            "reconnect-peers",
            "peer-left",
        ] {
            let kind = MessageKind::from(name);
            assert!(!matches!(kind, MessageKind::Unknown(_)), "{name}");
            assert_eq!(kind.as_str(), name);
        }
    }
}
