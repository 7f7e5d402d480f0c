use super::connection::{ConnectOutcome, ConnectionInfo, ConnectionState};
use super::endpoint::{display_origin, validate_server_url};
use super::state::{ClientState, Signal};
use super::{ConnectionManagerBuilder, ConnectionOptions};
use crate::SocketEvent;
use crate::callbacks::CallbackRegistry;
use crate::infrastructure::HeartbeatManager;
use crate::messaging::MessageRouter;
use crate::settings::SettingsProvider;
use crate::transport::{
    Connector, DisconnectReason, OutboundFrame, TransportEvent, TransportLink,
};
use crate::types::{AppState, AuthPayload, EventMessage, RealtimeError, Result};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub(crate) struct Inner {
    pub(crate) options: ConnectionOptions,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) registry: Arc<CallbackRegistry>,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) state: Arc<RwLock<ClientState>>,
    pub(crate) state_rx: watch::Receiver<ConnectionState>,
    pub(crate) signals: mpsc::UnboundedSender<Signal>,
    pub(crate) supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the single live event-stream connection to the parking server.
///
/// `ConnectionManager` authenticates with the vehicle identity from the
/// [`SettingsProvider`], joins the vehicle's room, keeps the link alive with an
/// application-level ping, reconnects with exponential backoff, and fans inbound
/// events out through the [`CallbackRegistry`].
///
/// Every method returns promptly. Outcomes of connection attempts arrive through
/// Connection callbacks (`true` = connected, `false` = offline or reconnecting).
///
/// # Example
///
/// ```no_run
/// use parking_realtime::{ConnectionManager, Identity, StaticSettings};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = StaticSettings::new("192.168.1.6:5000")
///     .with_identity(Identity::new("51F-12345", "0901234567"));
/// let manager = ConnectionManager::new(Arc::new(settings))?;
///
/// manager.registry().register_connection("banner", |connected| {
///     println!("online: {connected}");
/// });
/// manager.registry().register_vehicle("alerts", |event| {
///     println!("{}", event.alert_body());
/// });
///
/// manager.connect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager with default options, the Socket.IO connector and a
    /// logging notifier. Does not connect.
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Result<Self> {
        ConnectionManagerBuilder::new(settings).build()
    }

    pub fn builder(settings: Arc<dyn SettingsProvider>) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(settings)
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.inner.registry
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Receiver that observes every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.read().await.connection
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Starts a connection attempt.
    ///
    /// No-op when already connected or connecting. Attempts within the throttle
    /// window of the previous one are rejected. An unusable server URL or a missing
    /// identity aborts before any transport is opened and reports `false` to
    /// Connection callbacks; neither is retried automatically.
    pub async fn connect(&self) -> ConnectOutcome {
        self.begin_connect(true).await
    }

    /// Scheduled retries pass `throttled = false`; their own delay spaces them out.
    async fn begin_connect(&self, throttled: bool) -> ConnectOutcome {
        let mut state = self.inner.state.write().await;

        if state.shut_down {
            return ConnectOutcome::ShutDown;
        }
        match state.connection {
            ConnectionState::Connected => return ConnectOutcome::AlreadyConnected,
            ConnectionState::Connecting => return ConnectOutcome::InProgress,
            ConnectionState::Disconnected => {}
        }

        let now = Instant::now();
        if throttled && state.budget.is_throttled(now, self.inner.options.connect_throttle) {
            tracing::warn!("Connect called too soon after the previous attempt; ignoring");
            return ConnectOutcome::Throttled;
        }
        state.budget.mark_attempt_started(now);

        let raw_url = self.inner.settings.server_url();
        let url = match validate_server_url(&raw_url) {
            Ok(url) => url,
            Err(e) => return self.abort_connect(state, e),
        };
        let Some(identity) = self.inner.settings.identity() else {
            return self.abort_connect(state, RealtimeError::AuthMissing);
        };

        let auth = AuthPayload::new(&identity, &self.inner.options.client_type);
        let epoch = state.advance_epoch();
        state.server_url = Some(url.clone());
        state.identity = Some(identity);
        state.set_connection(ConnectionState::Connecting);
        tracing::info!("Connecting to {}", display_origin(&url));

        let connector = Arc::clone(&self.inner.connector);
        let signals = self.inner.signals.clone();
        // Each transport in the chain gets the full connect timeout
        let timeout = self.inner.options.connect_timeout * connector.transports_tried();
        state.tasks.spawn("open", async move {
            let signal = match tokio::time::timeout(timeout, connector.open(&url, &auth)).await {
                Ok(Ok(link)) => Signal::Opened { epoch, link },
                Ok(Err(error)) => Signal::OpenFailed { epoch, error },
                Err(_) => Signal::OpenFailed {
                    epoch,
                    error: RealtimeError::Timeout,
                },
            };
            let _ = signals.send(signal);
        });

        ConnectOutcome::Started
    }

    fn abort_connect(
        &self,
        state: tokio::sync::RwLockWriteGuard<'_, ClientState>,
        error: RealtimeError,
    ) -> ConnectOutcome {
        drop(state);
        tracing::error!("Cannot connect: {}", error);
        self.inner.registry.dispatch_connection(false);
        ConnectOutcome::Aborted(error.to_string())
    }

    /// Tears down any link, resets the reconnect budget and connects again after
    /// the force-reconnect delay.
    pub async fn force_reconnect(&self) {
        let mut state = self.inner.state.write().await;
        if state.shut_down {
            return;
        }
        tracing::info!("Force reconnect requested");

        let was_disconnected = state.connection == ConnectionState::Disconnected;
        if let Some(outbound) = state.detach_link() {
            let _ = outbound.send(OutboundFrame::Close);
        }
        state.cancel_reconnect();
        let epoch = state.advance_epoch();
        state.set_connection(ConnectionState::Disconnected);
        state.budget.reset_all();

        let delay = self.inner.options.force_reconnect_delay;
        let signals = self.inner.signals.clone();
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::ForcedConnectDue { epoch });
        }));
        drop(state);

        if !was_disconnected {
            self.inner.registry.dispatch_connection(false);
        }
    }

    /// Caller-initiated teardown. Tells the server (best effort), stops the ping
    /// loop and any pending reconnect, and closes the transport. Callback
    /// registrations are left alone.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.write().await;
        let previous = state.connection;

        state.cancel_reconnect();
        state.advance_epoch();
        if let Some(outbound) = state.detach_link() {
            if previous == ConnectionState::Connected {
                let goodbye = EventMessage::new(
                    SocketEvent::ClientDisconnect,
                    json!({ "reason": "client_initiated" }),
                )
                .stamped(&self.inner.options.client_type);
                let _ = outbound.send(OutboundFrame::Emit(goodbye));
            }
            let _ = outbound.send(OutboundFrame::Close);
        }
        state.set_connection(ConnectionState::Disconnected);
        drop(state);

        if previous != ConnectionState::Disconnected {
            tracing::info!("Disconnected from server");
            self.inner.registry.dispatch_connection(false);
        }
    }

    /// Disconnects, drops every callback registration and stops the supervisor.
    /// The manager cannot connect again afterwards.
    pub async fn cleanup(&self) {
        self.disconnect().await;
        self.inner.registry.clear();
        self.inner.router.clear_recent();

        {
            let mut state = self.inner.state.write().await;
            state.shut_down = true;
            state.cancel_reconnect();
            state.advance_epoch();
        }

        let supervisor = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = supervisor {
            handle.abort();
        }
        tracing::info!("Connection manager cleaned up");
    }

    pub async fn request_parking_status(&self) {
        self.emit_if_connected(SocketEvent::RequestParkingStatus, json!({}))
            .await;
    }

    pub async fn send_heartbeat(&self) {
        self.emit_if_connected(
            SocketEvent::Heartbeat,
            json!({ "heartbeat_type": "manual", "app_state": AppState::Foreground.as_str() }),
        )
        .await;
    }

    pub async fn report_app_state(&self, app_state: AppState) {
        self.emit_if_connected(
            SocketEvent::AppStateChange,
            json!({
                "app_state": app_state.as_str(),
                "state_change_time": chrono::Utc::now().timestamp_millis(),
            }),
        )
        .await;
    }

    /// Emits a test message. `true` means the emit was queued, not that the server answered.
    pub async fn test_connection(&self) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        self.emit_if_connected(
            SocketEvent::TestConnection,
            json!({ "test_timestamp": now, "test_id": format!("test_{now}") }),
        )
        .await
    }

    async fn emit_if_connected(&self, event: SocketEvent, payload: Value) -> bool {
        let state = self.inner.state.read().await;
        if state.connection != ConnectionState::Connected {
            tracing::debug!("Not connected; skipping {}", event);
            return false;
        }

        let message = EventMessage::new(event, payload).stamped(&self.inner.options.client_type);
        match state.emit(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Emit failed: {}", e);
                false
            }
        }
    }

    /// Connected and a pong arrived within two ping intervals.
    pub async fn is_connection_healthy(&self) -> bool {
        let state = self.inner.state.read().await;
        self.healthy(&state)
    }

    fn healthy(&self, state: &ClientState) -> bool {
        state.connection == ConnectionState::Connected
            && state
                .last_pong
                .is_some_and(|at| at.elapsed() < self.inner.options.ping_interval * 2)
    }

    pub async fn connection_info(&self) -> ConnectionInfo {
        let state = self.inner.state.read().await;
        ConnectionInfo {
            state: state.connection,
            server_url: state
                .server_url
                .as_ref()
                .map(display_origin)
                .unwrap_or_else(|| self.inner.settings.server_url()),
            reconnect_attempts: state.budget.attempts(),
            max_attempts: state.budget.max_attempts(),
            callbacks_registered: self.inner.registry.len(),
            transport: state.transport.map(|kind| kind.to_string()),
            socket_id: state.socket_id.clone(),
            millis_since_last_pong: state
                .last_pong
                .map(|at| at.elapsed().as_millis() as u64),
            healthy: self.healthy(&state),
        }
    }

    pub(crate) async fn handle_signal(&self, signal: Signal) {
        match signal {
            Signal::Opened { epoch, link } => self.on_opened(epoch, link).await,
            Signal::OpenFailed { epoch, error } => self.on_open_failed(epoch, error).await,
            Signal::Closed { epoch, reason } => self.on_link_lost(epoch, reason).await,
            Signal::Stale { epoch } => self.on_link_lost(epoch, DisconnectReason::PingTimeout).await,
            Signal::RetryDue { epoch } => self.on_retry_due(epoch).await,
            Signal::ForcedConnectDue { epoch } => {
                if self.inner.state.read().await.is_current(epoch) {
                    self.connect().await;
                }
            }
        }
    }

    async fn on_opened(&self, epoch: u64, link: TransportLink) {
        let mut state = self.inner.state.write().await;
        if !state.is_current(epoch) || state.connection != ConnectionState::Connecting {
            tracing::debug!("Discarding link opened for a superseded attempt");
            let _ = link.outbound.send(OutboundFrame::Close);
            return;
        }

        let TransportLink {
            kind,
            sid,
            outbound,
            inbound,
        } = link;

        state.budget.reset();
        state.last_pong = Some(Instant::now());
        state.outbound = Some(outbound);
        state.transport = Some(kind);
        state.socket_id = sid;
        state.set_connection(ConnectionState::Connected);

        let router = Arc::clone(&self.inner.router);
        let signals = self.inner.signals.clone();
        state
            .tasks
            .spawn("reader", read_loop(inbound, router, signals, epoch));

        let options = &self.inner.options;
        if let Some(identity) = state.identity.clone() {
            let join = EventMessage::new(
                SocketEvent::JoinVehicleRoom,
                json!({
                    "plate_number": identity.plate_number.to_uppercase(),
                    "owner_phone": identity.owner_phone,
                    "client_type": options.client_type,
                    "user_id": identity.plate_number,
                    "join_timestamp": chrono::Utc::now().timestamp_millis(),
                    "device_info": options.device_info,
                    "app_version": options.app_version,
                }),
            );
            if let Err(e) = state.emit(join) {
                tracing::warn!("Failed to join vehicle room: {}", e);
            }
        }
        let request = EventMessage::new(SocketEvent::RequestParkingStatus, json!({}))
            .stamped(&options.client_type);
        if let Err(e) = state.emit(request) {
            tracing::warn!("Failed to request parking status: {}", e);
        }

        let heartbeat = HeartbeatManager::new(
            Arc::downgrade(&self.inner.state),
            epoch,
            self.inner.signals.clone(),
        )
        .with_interval(options.ping_interval, options.liveness_window)
        .with_client_type(options.client_type.clone())
        .spawn();
        state.tasks.track("heartbeat", heartbeat);

        let origin = state.server_url.as_ref().map(display_origin).unwrap_or_default();
        drop(state);

        tracing::info!("Connected to {} via {}", origin, kind);
        self.inner.registry.dispatch_connection(true);
    }

    async fn on_open_failed(&self, epoch: u64, error: RealtimeError) {
        let mut state = self.inner.state.write().await;
        if !state.is_current(epoch) || state.connection != ConnectionState::Connecting {
            return;
        }

        state.detach_link();
        state.set_connection(ConnectionState::Disconnected);
        if error.is_refusal() {
            tracing::error!("{}; not retrying with the same identity", error);
        } else {
            tracing::error!("Connection failed: {}", error);
            self.schedule_reconnect(&mut state);
        }
        drop(state);

        self.inner.registry.dispatch_connection(false);
    }

    async fn on_link_lost(&self, epoch: u64, reason: DisconnectReason) {
        let mut state = self.inner.state.write().await;
        if !state.is_current(epoch) || state.connection != ConnectionState::Connected {
            return;
        }

        state.advance_epoch();
        if let Some(outbound) = state.detach_link() {
            // Stale links may still be open at the transport level
            let _ = outbound.send(OutboundFrame::Close);
        }
        state.set_connection(ConnectionState::Disconnected);

        if reason.is_recoverable() {
            tracing::warn!("Connection lost ({}); will reconnect", reason);
            self.schedule_reconnect(&mut state);
        } else {
            tracing::info!("Server ended the session ({}); not reconnecting", reason);
        }
        drop(state);

        self.inner.registry.dispatch_connection(false);
    }

    async fn on_retry_due(&self, epoch: u64) {
        {
            let mut state = self.inner.state.write().await;
            if !state.is_current(epoch) {
                tracing::debug!("Reconnect timer fired for a superseded cycle; ignoring");
                return;
            }
            state.reconnect_task = None;
            let attempt = state.budget.record_attempt();
            if state.connection != ConnectionState::Disconnected {
                return;
            }
            tracing::info!(
                "Reconnect attempt {}/{}",
                attempt,
                state.budget.max_attempts()
            );
        }
        self.begin_connect(false).await;
    }

    /// Arms the backoff timer, or gives up once the budget is spent.
    fn schedule_reconnect(&self, state: &mut ClientState) {
        if state.shut_down {
            return;
        }
        if state.budget.is_exhausted() {
            tracing::error!(
                "{}; call force_reconnect to resume",
                RealtimeError::BudgetExhausted {
                    attempts: state.budget.attempts()
                }
            );
            return;
        }

        let delay = state.budget.next_delay();
        let epoch = state.epoch;
        tracing::info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay,
            state.budget.attempts() + 1,
            state.budget.max_attempts()
        );

        state.cancel_reconnect();
        let signals = self.inner.signals.clone();
        state.reconnect_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::RetryDue { epoch });
        }));
    }
}

/// Feeds inbound events to the router until the link reports closure.
async fn read_loop(
    mut inbound: mpsc::Receiver<TransportEvent>,
    router: Arc<MessageRouter>,
    signals: mpsc::UnboundedSender<Signal>,
    epoch: u64,
) {
    tracing::debug!("Starting read task");
    let reason = loop {
        match inbound.recv().await {
            Some(TransportEvent::Message(message)) => router.route(message).await,
            Some(TransportEvent::Closed(reason)) => break reason,
            None => break DisconnectReason::TransportClose,
        }
    };
    tracing::debug!("Read task finished: {}", reason);
    let _ = signals.send(Signal::Closed { epoch, reason });
}
