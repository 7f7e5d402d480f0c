use super::engine_io::{EnginePacket, OpenHandshake, SocketPacket};
use super::{
    Connector, DisconnectReason, INBOUND_BUFFER, Inbound, OutboundFrame, TransportEvent,
    TransportKind, TransportLink, connect_sid, engine_url, interpret,
};
use crate::types::{AuthPayload, RealtimeError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Full-duplex transport over a WebSocket.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink> {
        let url = engine_url(base, TransportKind::WebSocket)?;
        tracing::debug!("Opening WebSocket to {}", url);

        let (mut ws, _) = connect_async(url.as_str()).await?;

        let handshake = match next_packet(&mut ws).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(RealtimeError::Protocol(format!(
                    "expected engine open packet, got {other:?}"
                )));
            }
        };

        let connect = SocketPacket::Connect(Some(serde_json::to_value(auth)?)).to_frame()?;
        ws.send(Message::Text(connect.into())).await?;

        let sid = loop {
            match next_packet(&mut ws).await? {
                EnginePacket::Ping(data) => {
                    ws.send(Message::Text(EnginePacket::Pong(data).encode().into()))
                        .await?;
                }
                EnginePacket::Message(body) => match SocketPacket::parse(&body)? {
                    SocketPacket::Connect(data) => break connect_sid(data),
                    SocketPacket::ConnectError(message) => {
                        return Err(RealtimeError::ConnectionRefused(message));
                    }
                    other => tracing::debug!("Ignoring {:?} before connect ack", other),
                },
                EnginePacket::Close => {
                    return Err(RealtimeError::Connection(
                        "server closed during handshake".to_string(),
                    ));
                }
                _ => {}
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        tokio::spawn(pump(ws, outbound_rx, inbound_tx, liveness_window(&handshake)));

        Ok(TransportLink {
            kind: TransportKind::WebSocket,
            sid: sid.or(Some(handshake.sid)),
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Longest silence from the server before the link counts as dead
pub(crate) fn liveness_window(handshake: &OpenHandshake) -> Duration {
    Duration::from_millis(handshake.ping_interval + handshake.ping_timeout)
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::parse(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(RealtimeError::Connection(
                    "socket closed during handshake".to_string(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Moves frames between the socket and the link channels until either side ends.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::Sender<TransportEvent>,
    liveness: Duration,
) {
    let (mut write, mut read) = ws.split();
    let deadline = tokio::time::sleep(liveness);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("Received frame: {}", text.as_str());
                    let packet = match EnginePacket::parse(text.as_str()) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::warn!("Dropping malformed engine packet: {}", e);
                            continue;
                        }
                    };
                    if matches!(packet, EnginePacket::Ping(_)) {
                        deadline.as_mut().reset(Instant::now() + liveness);
                    }
                    match interpret(packet) {
                        Inbound::Reply(reply) => {
                            if let Err(e) = write.send(Message::Text(reply.encode().into())).await {
                                tracing::warn!("Failed to answer engine ping: {}", e);
                                break DisconnectReason::TransportError;
                            }
                        }
                        Inbound::Deliver(TransportEvent::Closed(reason)) => break reason,
                        Inbound::Deliver(event) => {
                            if inbound.send(event).await.is_err() {
                                // Link owner is gone
                                let _ = write.close().await;
                                return;
                            }
                        }
                        Inbound::Ignore => {}
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        tracing::info!("Server closed socket: code={:?}, reason='{}'", frame.code, frame.reason);
                    }
                    break DisconnectReason::TransportClose;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    break DisconnectReason::TransportError;
                }
                None => break DisconnectReason::TransportClose,
            },
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Emit(message)) => {
                    let text = match SocketPacket::Event(message).to_frame() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Failed to encode outbound event: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("Sending frame: {}", text);
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        tracing::warn!("WebSocket write error: {}", e);
                        break DisconnectReason::TransportError;
                    }
                }
                Some(OutboundFrame::Close) => {
                    if let Ok(text) = SocketPacket::Disconnect.to_frame() {
                        let _ = write.send(Message::Text(text.into())).await;
                    }
                    let _ = write.close().await;
                    break DisconnectReason::ClientDisconnect;
                }
                None => {
                    let _ = write.close().await;
                    return;
                }
            },
            _ = &mut deadline => {
                tracing::warn!("No engine ping within {:?}", liveness);
                break DisconnectReason::PingTimeout;
            }
        }
    };

    tracing::debug!("WebSocket link closed: {}", reason);
    let _ = inbound.send(TransportEvent::Closed(reason)).await;
}
