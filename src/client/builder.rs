use super::manager::{ConnectionManager, Inner};
use super::state::ClientState;
use super::ConnectionState;
use crate::callbacks::CallbackRegistry;
use crate::infrastructure::ReconnectBudget;
use crate::messaging::MessageRouter;
use crate::notify::{LocalNotifier, LogNotifier};
use crate::settings::SettingsProvider;
use crate::transport::{Connector, SocketIoConnector};
use crate::types::constants::*;
use crate::types::{RealtimeError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};

/// Tuning for the connection manager. Defaults match the parking server's expectations.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Application-level ping period
    pub ping_interval: Duration,
    /// Silence after which the link is treated as stale
    pub liveness_window: Duration,
    pub connect_timeout: Duration,
    /// Minimum spacing between two connect attempts
    pub connect_throttle: Duration,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay: Duration,
    pub reconnect_delay: Duration,
    pub max_backoff_exponent: u32,
    pub max_reconnect_delay: Duration,
    pub reconnect_jitter: Duration,
    pub force_reconnect_delay: Duration,
    /// Zero disables vehicle-event de-duplication
    pub duplicate_window: Duration,
    pub client_type: String,
    pub app_version: String,
    pub device_info: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(PING_INTERVAL),
            liveness_window: Duration::from_millis(2 * PING_INTERVAL),
            connect_timeout: Duration::from_millis(CONNECTION_TIMEOUT),
            connect_throttle: Duration::from_millis(CONNECT_THROTTLE),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_reconnect_delay: Duration::from_millis(INITIAL_RECONNECT_DELAY),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY),
            max_backoff_exponent: MAX_BACKOFF_EXPONENT,
            max_reconnect_delay: Duration::from_millis(RECONNECT_DELAY << MAX_BACKOFF_EXPONENT),
            reconnect_jitter: Duration::from_millis(MAX_RECONNECT_JITTER),
            force_reconnect_delay: Duration::from_millis(FORCE_RECONNECT_DELAY),
            duplicate_window: Duration::from_millis(DUPLICATE_WINDOW),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            device_info: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl ConnectionOptions {
    fn validate(&self) -> Result<()> {
        if self.ping_interval.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "ping interval must be non-zero".to_string(),
            ));
        }
        if self.liveness_window <= self.ping_interval {
            return Err(RealtimeError::InvalidConfig(format!(
                "liveness window {:?} must exceed ping interval {:?}",
                self.liveness_window, self.ping_interval
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(RealtimeError::InvalidConfig(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        if self.client_type.trim().is_empty() {
            return Err(RealtimeError::InvalidConfig(
                "client type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn budget(&self) -> ReconnectBudget {
        ReconnectBudget::new(
            self.max_reconnect_attempts,
            self.initial_reconnect_delay,
            self.reconnect_delay,
        )
        .with_cap(self.max_backoff_exponent, self.max_reconnect_delay)
        .with_jitter(self.reconnect_jitter)
    }
}

/// Builder for ConnectionManager that wires collaborators and spawns the supervisor
pub struct ConnectionManagerBuilder {
    settings: Arc<dyn SettingsProvider>,
    options: ConnectionOptions,
    notifier: Option<Arc<dyn LocalNotifier>>,
    connector: Option<Arc<dyn Connector>>,
    registry: Option<Arc<CallbackRegistry>>,
}

impl ConnectionManagerBuilder {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            settings,
            options: ConnectionOptions::default(),
            notifier: None,
            connector: None,
            registry: None,
        }
    }

    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Defaults to [`LogNotifier`]
    pub fn notifier(mut self, notifier: Arc<dyn LocalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Defaults to [`SocketIoConnector`] (WebSocket, then long-polling)
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share a registry with other producers (e.g. the status poller)
    pub fn registry(mut self, registry: Arc<CallbackRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the manager and spawn its supervisor. Must run inside a Tokio runtime.
    pub fn build(self) -> Result<ConnectionManager> {
        self.options.validate()?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let state = Arc::new(RwLock::new(ClientState::new(self.options.budget(), state_tx)));

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CallbackRegistry::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(SocketIoConnector::new(self.options.connect_timeout)));

        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            notifier,
            Arc::clone(&self.settings),
            Arc::downgrade(&state),
            self.options.duplicate_window,
        ));

        let (signals, mut signal_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            options: self.options,
            settings: self.settings,
            connector,
            registry,
            router,
            state,
            state_rx,
            signals,
            supervisor: Mutex::new(None),
        });

        // Supervisor: every transition requested by a background task runs here.
        // It holds only a weak handle so dropping the last manager ends it.
        let weak = Arc::downgrade(&inner);
        let supervisor = tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ConnectionManager::from_inner(inner)
                    .handle_signal(signal)
                    .await;
            }
            tracing::debug!("Connection supervisor finished");
        });
        *inner
            .supervisor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(supervisor);

        Ok(ConnectionManager::from_inner(inner))
    }
}
