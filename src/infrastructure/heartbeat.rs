use crate::SocketEvent;
use crate::client::ConnectionState;
use crate::client::state::{ClientState, Signal};
use crate::types::EventMessage;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Application-level liveness loop for one link.
///
/// Every `interval` it checks the last pong: past `liveness_window` it reports the
/// link stale to the supervisor and exits, otherwise it emits a `ping`. The loop
/// exits as soon as the link it was started for is gone.
pub struct HeartbeatManager {
    interval: Duration,
    liveness_window: Duration,
    client_type: String,
    epoch: u64,
    state: Weak<RwLock<ClientState>>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl HeartbeatManager {
    pub(crate) fn new(
        state: Weak<RwLock<ClientState>>,
        epoch: u64,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        Self {
            interval: Duration::from_millis(crate::types::constants::PING_INTERVAL),
            liveness_window: Duration::from_millis(2 * crate::types::constants::PING_INTERVAL),
            client_type: crate::types::constants::DEFAULT_CLIENT_TYPE.to_string(),
            epoch,
            state,
            signals,
        }
    }

    pub fn with_interval(mut self, interval: Duration, liveness_window: Duration) -> Self {
        self.interval = interval;
        self.liveness_window = liveness_window;
        self
    }

    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    /// Spawns the ping task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            // First tick one interval after connect, not immediately
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(state) = self.state.upgrade() else {
                    break;
                };
                let state = state.read().await;
                if !state.is_current(self.epoch) || state.connection != ConnectionState::Connected {
                    break;
                }

                let silent_for = state
                    .last_pong
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if silent_for > self.liveness_window {
                    tracing::warn!("No pong for {:?}; treating connection as stale", silent_for);
                    let _ = self.signals.send(Signal::Stale { epoch: self.epoch });
                    break;
                }

                let ping = EventMessage::new(SocketEvent::Ping, serde_json::json!({}))
                    .stamped(&self.client_type);
                if let Err(e) = state.emit(ping) {
                    tracing::warn!("Failed to send ping: {}", e);
                }
            }
            tracing::debug!("Heartbeat task finished");
        })
    }
}
