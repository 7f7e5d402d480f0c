use super::connection::ConnectionState;
use crate::infrastructure::{ReconnectBudget, TaskManager};
use crate::transport::{DisconnectReason, OutboundFrame, TransportKind, TransportLink};
use crate::types::{EventMessage, Identity, RealtimeError, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

/// Consolidated mutable state for ConnectionManager.
/// One lock covers every transition so no two of them interleave.
pub struct ClientState {
    pub connection: ConnectionState,

    pub budget: ReconnectBudget,

    /// Last liveness pong (or connect time)
    pub last_pong: Option<Instant>,

    /// Bumped on every transition that invalidates in-flight work. Background
    /// tasks carry the epoch they were started under and are ignored once it moves on.
    pub epoch: u64,

    /// Frame sender of the live link
    pub outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,

    /// Tasks bound to the current attempt or link (open, reader, heartbeat)
    pub tasks: TaskManager,

    /// Pending reconnect or forced-connect timer
    pub reconnect_task: Option<JoinHandle<()>>,

    pub transport: Option<TransportKind>,
    pub socket_id: Option<String>,
    pub server_url: Option<Url>,
    pub identity: Option<Identity>,

    /// Set by `cleanup()`; nothing reconnects afterwards
    pub shut_down: bool,

    state_tx: watch::Sender<ConnectionState>,
}

impl ClientState {
    pub fn new(budget: ReconnectBudget, state_tx: watch::Sender<ConnectionState>) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            budget,
            last_pong: None,
            epoch: 0,
            outbound: None,
            tasks: TaskManager::new(),
            reconnect_task: None,
            transport: None,
            socket_id: None,
            server_url: None,
            identity: None,
            shut_down: false,
            state_tx,
        }
    }

    /// Set connection state and notify watchers
    pub fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            tracing::debug!("Connection state {} -> {}", self.connection, state);
        }
        self.connection = state;
        self.state_tx.send_replace(state);
    }

    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        !self.shut_down && self.epoch == epoch
    }

    /// Stops the link's tasks and hands back its frame sender, if any.
    pub fn detach_link(&mut self) -> Option<mpsc::UnboundedSender<OutboundFrame>> {
        self.tasks.abort_all();
        self.transport = None;
        self.socket_id = None;
        self.outbound.take()
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect_task.take() {
            handle.abort();
        }
    }

    /// Queues an event on the live link.
    pub fn emit(&self, message: EventMessage) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(RealtimeError::NotConnected)?;
        let event = message.event.clone();
        outbound
            .send(OutboundFrame::Emit(message))
            .map_err(|_| RealtimeError::Transport(format!("link closed before sending {event}")))?;
        tracing::debug!("Queued {}", event);
        Ok(())
    }
}

impl Drop for ClientState {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

/// Messages from background tasks to the supervisor, which owns every transition.
pub(crate) enum Signal {
    Opened { epoch: u64, link: TransportLink },
    OpenFailed { epoch: u64, error: RealtimeError },
    Closed { epoch: u64, reason: DisconnectReason },
    /// Ping loop saw no pong inside the liveness window
    Stale { epoch: u64 },
    RetryDue { epoch: u64 },
    ForcedConnectDue { epoch: u64 },
}
