use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Bytes, Message};
use tracing::{debug, error, info, warn};

use super::coordinator::Coordinator;
use super::messages::Envelope;
use super::peer::{OUTBOUND_QUEUE_CAPACITY, Peer};
use super::types::{OutboundMessage, PeerId, SignalingError};

pub const DEFAULT_SIGNALING_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PATH: &str = "/ws";
const CLIENT_ID_PARAM: &str = "clientId";
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a closing connection may spend flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Request path the WebSocket endpoint is served on.
    pub path: String,
    /// Ping every interval and drop peers that stop answering. Off when `None`.
    pub ping_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            ping_interval: None,
        }
    }
}

pub struct SignalingServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    config: Arc<ServerConfig>,
}

impl SignalingServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "Signaling server listening on {} (path {})",
            listener.local_addr()?,
            config.path
        );

        Ok(Self {
            listener,
            coordinator: Arc::new(Coordinator::new()),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            let coordinator = Arc::clone(&self.coordinator);
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                match handle_connection(stream, addr, coordinator, config).await {
                    Ok(()) => {}
                    Err(SignalingError::Transport(tungstenite::Error::Http(response))) => {
                        info!("Rejected connection from {}: {}", addr, response.status());
                    }
                    Err(e) => error!("Connection error from {}: {}", addr, e),
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<Coordinator>,
    config: Arc<ServerConfig>,
) -> Result<(), SignalingError> {
    let mut client_id = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let id = authorize_upgrade(request, &config.path)?;
            client_id = Some(id);
            Ok(response)
        },
    )
    .await?;
    let Some(client_id) = client_id else {
        return Ok(());
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let peer = Arc::new(Peer::new(client_id, tx));
    info!("Peer {} connected from {}", peer.id(), addr);

    let mut ping_interval = config.ping_interval.map(tokio::time::interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        // Flushes a pending close reply, or starts the close handshake.
        let _ = ws_tx.close().await;
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = next_tick(&mut ping_interval) => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", peer.id());
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", peer.id());
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", peer.id());
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", peer.id(), e);
                        break;
                    }
                    None => break,
                };

                let parsed = match msg {
                    Message::Text(text) => Envelope::parse(text.as_str()),
                    Message::Binary(data) => Envelope::from_slice(&data),
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", peer.id());
                        continue;
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", peer.id());
                        break;
                    }
                    _ => continue,
                };

                match parsed {
                    Ok(envelope) => {
                        if let Err(e) = coordinator.dispatch(&peer, envelope).await {
                            warn!("Dropped message from {}: {}", peer.id(), e);
                        }
                    }
                    Err(e) => {
                        warn!("Malformed frame from {}, disconnecting: {}", peer.id(), e);
                        break;
                    }
                }
            }
        }
    }

    coordinator.disconnect(&peer).await;

    // Closing both channels lets the writer drain what is queued and exit.
    let peer_id = peer.id().clone();
    drop(ctrl_tx);
    drop(peer);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        debug!("Writer for {} did not drain in time, aborting", peer_id);
        send_task.abort();
    }
    info!("Peer {} disconnected ({})", peer_id, addr);

    Ok(())
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Accept the upgrade only on the configured path and only with a client id.
fn authorize_upgrade(request: &Request, path: &str) -> Result<PeerId, ErrorResponse> {
    if request.uri().path() != path {
        debug!("Rejected upgrade for unknown path {}", request.uri().path());
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }

    client_id_from_query(request.uri().query()).ok_or_else(|| {
        debug!("Rejected upgrade without {}", CLIENT_ID_PARAM);
        reject(StatusCode::BAD_REQUEST, "clientId is required")
    })
}

fn client_id_from_query(query: Option<&str>) -> Option<PeerId> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == CLIENT_ID_PARAM)
        .map(|(_, value)| PeerId::from(value.into_owned()))
        .filter(|id| !id.is_empty())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
