//! Socket.IO-shaped event transports.
//!
//! A [`Connector`] opens one authenticated [`TransportLink`]. The link is a pair of
//! channels: the manager pushes [`OutboundFrame`]s in, and the transport task pushes
//! [`TransportEvent`]s out until it reports [`TransportEvent::Closed`] exactly once.

pub mod engine_io;
#[cfg(test)]
pub(crate) mod mock;
pub mod polling;
pub mod websocket;

use crate::types::constants::{
    ENGINE_IO_VERSION, SOCKET_IO_PATH, TRANSPORT_POLLING, TRANSPORT_WEBSOCKET, disconnect_reasons,
};
use crate::types::{AuthPayload, EventMessage, RealtimeError, Result};
use async_trait::async_trait;
use engine_io::{EnginePacket, SocketPacket};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

pub use polling::PollingConnector;
pub use websocket::WebSocketConnector;

/// Inbound queue depth per link
pub(crate) const INBOUND_BUFFER: usize = 64;

/// Transport mechanism carrying a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => TRANSPORT_WEBSOCKET,
            Self::Polling => TRANSPORT_POLLING,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server ended the session on purpose
    ServerDisconnect,
    ClientDisconnect,
    TransportClose,
    TransportError,
    PingTimeout,
    Other(String),
}

impl DisconnectReason {
    pub fn classify(reason: &str) -> Self {
        match reason {
            disconnect_reasons::SERVER_DISCONNECT => Self::ServerDisconnect,
            disconnect_reasons::CLIENT_DISCONNECT => Self::ClientDisconnect,
            disconnect_reasons::TRANSPORT_CLOSE => Self::TransportClose,
            disconnect_reasons::TRANSPORT_ERROR => Self::TransportError,
            disconnect_reasons::PING_TIMEOUT => Self::PingTimeout,
            other => Self::Other(other.to_string()),
        }
    }

    /// Everything except a server-initiated close is worth reconnecting after.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ServerDisconnect)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerDisconnect => disconnect_reasons::SERVER_DISCONNECT,
            Self::ClientDisconnect => disconnect_reasons::CLIENT_DISCONNECT,
            Self::TransportClose => disconnect_reasons::TRANSPORT_CLOSE,
            Self::TransportError => disconnect_reasons::TRANSPORT_ERROR,
            Self::PingTimeout => disconnect_reasons::PING_TIMEOUT,
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame queued by the manager for the server
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Emit(EventMessage),
    /// Send the socket disconnect packet and end the link
    Close,
}

/// Event delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(EventMessage),
    Closed(DisconnectReason),
}

/// One open, authenticated connection.
pub struct TransportLink {
    pub kind: TransportKind,
    /// Socket.IO session id assigned by the server
    pub sid: Option<String>,
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink")
            .field("kind", &self.kind)
            .field("sid", &self.sid)
            .finish_non_exhaustive()
    }
}

/// Opens transport links. Implemented by the real transports and by test doubles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a link to `base` (validated `scheme://host[:port]`) authenticated with `auth`.
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink>;

    /// How many transports one `open` may try in turn, each bounded by the connect
    /// timeout. The caller's bound on `open` scales with it.
    fn transports_tried(&self) -> u32 {
        1
    }
}

/// What a running transport does with one engine packet after the handshake
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    Reply(EnginePacket),
    Deliver(TransportEvent),
    Ignore,
}

pub(crate) fn interpret(packet: EnginePacket) -> Inbound {
    match packet {
        EnginePacket::Ping(data) => Inbound::Reply(EnginePacket::Pong(data)),
        EnginePacket::Close => {
            Inbound::Deliver(TransportEvent::Closed(DisconnectReason::TransportClose))
        }
        EnginePacket::Message(body) => match SocketPacket::parse(&body) {
            Ok(SocketPacket::Event(message)) => Inbound::Deliver(TransportEvent::Message(message)),
            Ok(SocketPacket::Disconnect) => {
                Inbound::Deliver(TransportEvent::Closed(DisconnectReason::ServerDisconnect))
            }
            Ok(SocketPacket::ConnectError(message)) => {
                Inbound::Deliver(TransportEvent::Closed(DisconnectReason::Other(message)))
            }
            Ok(_) => Inbound::Ignore,
            Err(e) => {
                tracing::warn!("Dropping malformed socket packet: {}", e);
                Inbound::Ignore
            }
        },
        _ => Inbound::Ignore,
    }
}

/// Extracts the session id the server puts in its connect acknowledgement.
pub(crate) fn connect_sid(data: Option<serde_json::Value>) -> Option<String> {
    data.and_then(|data| data.get("sid").and_then(|sid| sid.as_str()).map(str::to_string))
}

/// Builds `<base>/socket.io/?EIO=4&transport=<kind>`, switching to `ws`/`wss`
/// for WebSocket.
pub fn engine_url(base: &Url, kind: TransportKind) -> Result<Url> {
    let mut url = base.join(SOCKET_IO_PATH)?;
    if kind == TransportKind::WebSocket {
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| {
            RealtimeError::InvalidServerUrl(format!("cannot use {scheme} with {base}"))
        })?;
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", kind.as_str());
    Ok(url)
}

/// Tries WebSocket first, then HTTP long-polling, each bounded by the connect timeout.
///
/// A refusal from the server ends the chain: the next transport would carry the
/// same credentials.
pub struct SocketIoConnector {
    connect_timeout: Duration,
    transports: Vec<Box<dyn Connector>>,
}

impl SocketIoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self::with_transports(
            connect_timeout,
            vec![
                Box::new(WebSocketConnector::new()),
                Box::new(PollingConnector::new()),
            ],
        )
    }

    /// Custom transport chain, tried in order.
    pub fn with_transports(connect_timeout: Duration, transports: Vec<Box<dyn Connector>>) -> Self {
        Self {
            connect_timeout,
            transports,
        }
    }
}

#[async_trait]
impl Connector for SocketIoConnector {
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink> {
        let mut last_error = RealtimeError::Connection("no transport configured".to_string());

        for transport in &self.transports {
            match tokio::time::timeout(self.connect_timeout, transport.open(base, auth)).await {
                Ok(Ok(link)) => {
                    tracing::info!("Transport {} connected to {}", link.kind, base);
                    return Ok(link);
                }
                Ok(Err(e)) if e.is_refusal() => return Err(e),
                Ok(Err(e)) => {
                    tracing::warn!("Transport failed, trying next: {}", e);
                    last_error = e;
                }
                Err(_) => {
                    tracing::warn!("Transport timed out after {:?}", self.connect_timeout);
                    last_error = RealtimeError::Timeout;
                }
            }
        }

        Err(last_error)
    }

    fn transports_tried(&self) -> u32 {
        self.transports.len().max(1) as u32
    }
}
