use super::codec::{decode_notification, decode_parking_status, decode_vehicle_event};
use super::dedup::RecentVehicleEvents;
use crate::SocketEvent;
use crate::callbacks::CallbackRegistry;
use crate::client::state::ClientState;
use crate::notify::LocalNotifier;
use crate::settings::SettingsProvider;
use crate::types::EventMessage;
use crate::types::constants::inbound_events;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Inbound kinds that are only logged
const LOG_ONLY: &[&str] = &[
    inbound_events::JOINED_ROOM,
    inbound_events::HEARTBEAT_ACK,
    inbound_events::TEST_MESSAGE,
    inbound_events::ILLEGAL_PARKING_EVENT,
];

/// Routes inbound events to decoders, the local notifier and the callback registry.
///
/// A malformed payload is logged and dropped; routing of later messages is unaffected.
pub struct MessageRouter {
    registry: Arc<CallbackRegistry>,
    notifier: Arc<dyn LocalNotifier>,
    settings: Arc<dyn SettingsProvider>,
    state: Weak<RwLock<ClientState>>,
    recent: Mutex<RecentVehicleEvents>,
}

impl MessageRouter {
    pub(crate) fn new(
        registry: Arc<CallbackRegistry>,
        notifier: Arc<dyn LocalNotifier>,
        settings: Arc<dyn SettingsProvider>,
        state: Weak<RwLock<ClientState>>,
        duplicate_window: Duration,
    ) -> Self {
        Self {
            registry,
            notifier,
            settings,
            state,
            recent: Mutex::new(RecentVehicleEvents::new(duplicate_window)),
        }
    }

    /// Routes a message to the appropriate handler
    pub async fn route(&self, message: EventMessage) {
        tracing::debug!("Routing {}: {}", message.event, message.payload);

        match &message.event {
            SocketEvent::VehicleNotification => self.on_vehicle(&message.payload),
            SocketEvent::ParkingStatusUpdate => self.on_status(&message.payload),
            SocketEvent::Notification => self.on_notification(&message.payload),
            SocketEvent::Pong => self.on_pong().await,
            SocketEvent::RoomJoined | SocketEvent::SystemInfo => {
                tracing::info!("{}: {}", message.event, message.payload);
            }
            SocketEvent::Error => tracing::warn!("Server reported error: {}", message.payload),
            SocketEvent::Custom(name) if LOG_ONLY.contains(&name.as_str()) => {
                tracing::debug!("{}: {}", name, message.payload);
            }
            other => tracing::debug!("Ignoring unexpected event {}", other),
        }
    }

    fn on_vehicle(&self, payload: &serde_json::Value) {
        let event = match decode_vehicle_event(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping vehicle notification: {}", e);
                return;
            }
        };

        let duplicate = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_duplicate(&event);
        if duplicate {
            tracing::info!(
                "Dropping duplicate {} event for {}",
                event.action.as_str(),
                event.plate_number
            );
            return;
        }

        tracing::info!("Vehicle {} {}", event.plate_number, event.action.as_str());
        if self.settings.notifications_enabled() {
            guarded("vehicle alert", || self.notifier.show_vehicle(&event));
        }
        self.registry.dispatch_vehicle(&event);
    }

    fn on_status(&self, payload: &serde_json::Value) {
        match decode_parking_status(payload) {
            Ok(status) => {
                tracing::debug!(
                    "Parking status: {}/{} available",
                    status.snapshot.available,
                    status.snapshot.total
                );
                self.registry.dispatch_status(&status);
            }
            Err(e) => tracing::warn!("Dropping parking status update: {}", e),
        }
    }

    fn on_notification(&self, payload: &serde_json::Value) {
        match decode_notification(payload) {
            Ok(item) => {
                if self.settings.notifications_enabled() {
                    guarded("notification alert", || self.notifier.show(&item));
                }
                self.registry.dispatch_notification(&item);
            }
            Err(e) => tracing::warn!("Dropping notification: {}", e),
        }
    }

    async fn on_pong(&self) {
        if let Some(state) = self.state.upgrade() {
            state.write().await.last_pong = Some(Instant::now());
            tracing::debug!("Pong received");
        }
    }

    /// Forgets recently seen vehicle events.
    pub fn clear_recent(&self) {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn guarded(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("Local notifier panicked while showing {}", what);
    }
}
