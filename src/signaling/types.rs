use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Utf8Bytes};

use super::messages::MessageKind;

/// Signaling errors.
///
/// None of these are reported back to the client; the connection loop logs
/// them and carries on, except for `Transport` and `Json` which end the
/// connection.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("{kind} message is missing required field `{field}`")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("unrecognized message type `{0}`")]
    UnexpectedType(MessageKind),

    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("peer {peer} not found in room {room}")]
    PeerNotFound { room: RoomId, peer: PeerId },

    #[error("delivery to peer {0} failed: outbound channel closed")]
    Delivery(PeerId),

    #[error("outbound queue of peer {0} is full")]
    Backlogged(PeerId),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Defines a string identifier that travels as a plain JSON string.
/// An empty identifier means "not supplied".
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            /// `null` reads as an empty id, the same as an absent field.
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Option::<String>::deserialize(deserializer).map(|s| Self(s.unwrap_or_default()))
            }
        }
    };
}

string_id! {
    /// Client-supplied peer identity, taken from the `clientId` query parameter.
    PeerId
}

string_id! {
    /// Room identifier. Rooms are keyed by whatever string clients agree on.
    RoomId
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
