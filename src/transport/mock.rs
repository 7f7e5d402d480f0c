//! In-memory transport for exercising the connection manager without a network.

use super::{Connector, OutboundFrame, TransportEvent, TransportKind, TransportLink};
use crate::types::{AuthPayload, EventMessage, RealtimeError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

/// The server end of one mock link
pub(crate) struct ServerSide {
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    pub inbound: mpsc::Sender<TransportEvent>,
}

impl ServerSide {
    /// Pushes an event to the client.
    pub async fn push(&self, event: &str, payload: serde_json::Value) {
        self.inbound
            .send(TransportEvent::Message(EventMessage::new(event, payload)))
            .await
            .unwrap();
    }

    /// Everything the client has emitted so far.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Names of the events the client has emitted so far.
    pub fn drain_events(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Emit(message) => Some(message.event.as_str().to_string()),
                OutboundFrame::Close => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct MockState {
    opens: usize,
    refuse: bool,
    reject: Option<String>,
    last_auth: Option<AuthPayload>,
    last_base: Option<Url>,
    servers: VecDeque<ServerSide>,
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `open` fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Makes every following `open` answer with a server refusal.
    pub fn set_reject(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject = reason.map(str::to_string);
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn last_auth(&self) -> Option<AuthPayload> {
        self.state.lock().unwrap().last_auth.clone()
    }

    pub fn last_base(&self) -> Option<Url> {
        self.state.lock().unwrap().last_base.clone()
    }

    /// Server end of the oldest link not yet taken.
    pub fn take_server(&self) -> Option<ServerSide> {
        self.state.lock().unwrap().servers.pop_front()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.last_auth = Some(auth.clone());
        state.last_base = Some(base.clone());

        if state.refuse {
            return Err(RealtimeError::Connection("connection refused".to_string()));
        }
        if let Some(reason) = &state.reject {
            return Err(RealtimeError::ConnectionRefused(reason.clone()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        state.servers.push_back(ServerSide {
            outbound: outbound_rx,
            inbound: inbound_tx,
        });

        Ok(TransportLink {
            kind: TransportKind::WebSocket,
            sid: Some(format!("mock-{}", state.opens)),
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Transport whose handshake never completes (stalled upgrade, dropped SYN).
#[derive(Clone, Default)]
pub(crate) struct HangingConnector {
    opens: Arc<Mutex<usize>>,
}

impl HangingConnector {
    pub fn opens(&self) -> usize {
        *self.opens.lock().unwrap()
    }
}

#[async_trait]
impl Connector for HangingConnector {
    async fn open(&self, _base: &Url, _auth: &AuthPayload) -> Result<TransportLink> {
        *self.opens.lock().unwrap() += 1;
        std::future::pending().await
    }
}

/// Wraps a [`MockConnector`] with a handshake that takes `delay`.
pub(crate) struct DelayedConnector {
    pub delay: std::time::Duration,
    pub inner: MockConnector,
}

#[async_trait]
impl Connector for DelayedConnector {
    async fn open(&self, base: &Url, auth: &AuthPayload) -> Result<TransportLink> {
        tokio::time::sleep(self.delay).await;
        self.inner.open(base, auth).await
    }
}
