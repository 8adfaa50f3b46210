//! WebSocket signaling relay for WebRTC peers

mod coordinator;
mod messages;
mod peer;
mod room;
mod server;
mod types;

pub use coordinator::Coordinator;
pub use messages::{Envelope, MessageKind, PeerList, SERVER_SENDER};
pub use peer::{OUTBOUND_QUEUE_CAPACITY, Peer};
pub use room::Room;
pub use server::{DEFAULT_PATH, DEFAULT_SIGNALING_ADDR, ServerConfig, SignalingServer};
pub use types::{OutboundMessage, PeerId, RoomId, SignalingError};
