use super::engine_io::{EnginePacket, SocketPacket};
use super::websocket::liveness_window;
use super::{
    Connector, DisconnectReason, INBOUND_BUFFER, Inbound, OutboundFrame, TransportEvent,
    TransportKind, TransportLink, connect_sid, engine_url, interpret,
};
use crate::types::{AuthPayload, RealtimeError, Result};
use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use url::Url;

/// Handshake requests are short; long-poll requests get the server's liveness window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Request/response transport over HTTP long-polling.
#[derive(Debug, Clone, Default)]
pub struct PollingConnector {
    http: reqwest::Client,
}

impl PollingConnector {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

/// One Engine.IO polling session
#[derive(Clone)]
struct PollingSession {
    http: reqwest::Client,
    url: Url,
}

impl PollingSession {
    async fn poll(self, timeout: Duration) -> Result<Vec<EnginePacket>> {
        let response = self
            .http
            .get(self.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(RealtimeError::Transport(format!(
                "poll failed with HTTP {}",
                response.status()
            )));
        }
        EnginePacket::parse_payload(&response.text().await.map_err(transport_error)?)
    }

    async fn post(&self, packet: String) -> Result<()> {
        let response = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .timeout(HANDSHAKE_TIMEOUT)
            .body(packet)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(RealtimeError::Transport(format!(
                "post failed with HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Failures here belong to the live link, not to the HTTP status fallback.
fn transport_error(e: reqwest::Error) -> RealtimeError {
    RealtimeError::Transport(format!("polling request failed: {e}"))
}

#[async_trait]
impl Connector for PollingConnector {
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink> {
        let mut url = engine_url(base, TransportKind::Polling)?;
        tracing::debug!("Opening polling session at {}", url);

        let bootstrap = PollingSession {
            http: self.http.clone(),
            url: url.clone(),
        };
        let handshake = match bootstrap.poll(HANDSHAKE_TIMEOUT).await?.into_iter().next() {
            Some(EnginePacket::Open(handshake)) => handshake,
            other => {
                return Err(RealtimeError::Protocol(format!(
                    "expected engine open packet, got {other:?}"
                )));
            }
        };

        url.query_pairs_mut().append_pair("sid", &handshake.sid);
        let session = PollingSession {
            http: self.http.clone(),
            url,
        };
        let liveness = liveness_window(&handshake);

        session
            .post(SocketPacket::Connect(Some(serde_json::to_value(auth)?)).to_frame()?)
            .await?;

        let (sid, leftover) = 'handshake: loop {
            let mut packets = session.clone().poll(liveness).await?.into_iter();
            while let Some(packet) = packets.next() {
                match packet {
                    EnginePacket::Ping(data) => session.post(EnginePacket::Pong(data).encode()).await?,
                    EnginePacket::Message(body) => match SocketPacket::parse(&body)? {
                        SocketPacket::Connect(data) => {
                            // Events may share the payload with the connect ack
                            break 'handshake (connect_sid(data), packets.collect::<Vec<_>>());
                        }
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
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        tokio::spawn(pump(session, leftover, outbound_rx, inbound_tx, liveness));

        Ok(TransportLink {
            kind: TransportKind::Polling,
            sid: sid.or(Some(handshake.sid)),
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

enum Flow {
    Continue,
    Closed(DisconnectReason),
    OwnerGone,
}

/// Handles one batch of polled packets.
async fn deliver(
    packets: Vec<EnginePacket>,
    session: &PollingSession,
    inbound: &mpsc::Sender<TransportEvent>,
    mut deadline: Pin<&mut Sleep>,
    liveness: Duration,
) -> Flow {
    for packet in packets {
        if matches!(packet, EnginePacket::Ping(_)) {
            deadline.as_mut().reset(Instant::now() + liveness);
        }
        match interpret(packet) {
            Inbound::Reply(reply) => {
                if let Err(e) = session.post(reply.encode()).await {
                    tracing::warn!("Failed to answer engine ping: {}", e);
                    return Flow::Closed(DisconnectReason::TransportError);
                }
            }
            Inbound::Deliver(TransportEvent::Closed(reason)) => return Flow::Closed(reason),
            Inbound::Deliver(event) => {
                if inbound.send(event).await.is_err() {
                    return Flow::OwnerGone;
                }
            }
            Inbound::Ignore => {}
        }
    }
    Flow::Continue
}

/// Keeps one long-poll in flight and posts outbound frames as they arrive.
async fn pump(
    session: PollingSession,
    leftover: Vec<EnginePacket>,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::Sender<TransportEvent>,
    liveness: Duration,
) {
    let deadline = tokio::time::sleep(liveness);
    tokio::pin!(deadline);

    let reason = match deliver(leftover, &session, &inbound, deadline.as_mut(), liveness).await {
        Flow::Continue => run(&session, &mut outbound, &inbound, deadline, liveness).await,
        Flow::Closed(reason) => Some(reason),
        Flow::OwnerGone => None,
    };

    if let Some(reason) = reason {
        tracing::debug!("Polling link closed: {}", reason);
        let _ = inbound.send(TransportEvent::Closed(reason)).await;
    }
}

/// Returns the close reason, or `None` when the link owner went away.
async fn run(
    session: &PollingSession,
    outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: &mpsc::Sender<TransportEvent>,
    mut deadline: Pin<&mut Sleep>,
    liveness: Duration,
) -> Option<DisconnectReason> {
    let mut poll = Box::pin(session.clone().poll(liveness));

    loop {
        tokio::select! {
            result = &mut poll => {
                let packets = match result {
                    Ok(packets) => packets,
                    Err(e) => {
                        tracing::warn!("Long-poll failed: {}", e);
                        return Some(DisconnectReason::TransportError);
                    }
                };
                match deliver(packets, session, inbound, deadline.as_mut(), liveness).await {
                    Flow::Continue => {}
                    Flow::Closed(reason) => return Some(reason),
                    Flow::OwnerGone => return None,
                }
                poll = Box::pin(session.clone().poll(liveness));
            }
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Emit(message)) => {
                    let text = match SocketPacket::Event(message).to_frame() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Failed to encode outbound event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = session.post(text).await {
                        tracing::warn!("Polling write error: {}", e);
                        return Some(DisconnectReason::TransportError);
                    }
                }
                Some(OutboundFrame::Close) => {
                    if let Ok(text) = SocketPacket::Disconnect.to_frame() {
                        let _ = session.post(text).await;
                    }
                    return Some(DisconnectReason::ClientDisconnect);
                }
                None => return None,
            },
            _ = deadline.as_mut() => {
                tracing::warn!("No engine ping within {:?}", liveness);
                return Some(DisconnectReason::PingTimeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPEN: &str = r#"0{"sid":"poll-sid","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000}"#;

    #[tokio::test]
    async fn test_polling_handshake_and_event() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("transport", "polling"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OPEN))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/socket.io/"))
            .and(query_param("sid", "poll-sid"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("sid", "poll-sid"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "40{\"sid\":\"socket-1\"}\u{1e}42[\"system_info\",{\"version\":\"2\"}]",
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("sid", "poll-sid"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let auth = AuthPayload::new(&Identity::new("51F-12345", "0901234567"), "android");
        let mut link = PollingConnector::new().open(&base, &auth).await.unwrap();

        assert_eq!(link.kind, TransportKind::Polling);
        assert_eq!(link.sid.as_deref(), Some("socket-1"));

        let Some(TransportEvent::Message(message)) = link.inbound.recv().await else {
            panic!("expected system_info message");
        };
        assert_eq!(message.payload["version"], "2");

        assert_eq!(
            link.inbound.recv().await,
            Some(TransportEvent::Closed(DisconnectReason::TransportClose))
        );
    }

    #[tokio::test]
    async fn test_polling_connect_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/socket.io/"))
            .and(query_param("transport", "polling"))
            .respond_with(ResponseTemplate::new(200).set_body_string(OPEN))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("sid", "poll-sid"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"44{"message":"Unknown vehicle"}"#),
            )
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let auth = AuthPayload::new(&Identity::new("51F-12345", "0901234567"), "android");
        let err = PollingConnector::new().open(&base, &auth).await.unwrap_err();

        assert!(matches!(&err, RealtimeError::ConnectionRefused(m) if m == "Unknown vehicle"));
        assert!(err.is_refusal());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_transport_error() {
        // Bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let base = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let auth = AuthPayload::new(&Identity::new("51F-12345", "0901234567"), "android");
        let err = PollingConnector::new().open(&base, &auth).await.unwrap_err();

        assert!(matches!(err, RealtimeError::Transport(_)));
        assert!(!err.is_http());
        assert!(!err.to_string().starts_with("Status request failed"));
    }
}
