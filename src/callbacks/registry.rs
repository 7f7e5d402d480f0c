use crate::types::{NotificationItem, ParkingStatus, RealtimeError, VehicleEvent};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Which event stream a subscription listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Vehicle,
    Status,
    Connection,
    Notification,
}

/// Handlers for one event kind, keyed by subscriber id.
struct HandlerMap<T> {
    kind: CallbackKind,
    handlers: Mutex<HashMap<String, Handler<T>>>,
}

impl<T> HandlerMap<T> {
    fn new(kind: CallbackKind) -> Self {
        Self {
            kind,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Handler<T>>> {
        // Handlers never run under the lock, so poisoning cannot leave the map half-written.
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: String, handler: Handler<T>) -> bool {
        self.lock().insert(id, handler).is_some()
    }

    fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    /// Calls every handler with `payload`. Returns how many ran to completion.
    fn dispatch(&self, payload: &T) -> usize {
        let snapshot: Vec<(String, Handler<T>)> = {
            let handlers = self.lock();
            handlers
                .iter()
                .map(|(id, handler)| (id.clone(), Arc::clone(handler)))
                .collect()
        }; // Lock released here

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!("{:?} callback '{}' panicked; skipping it", self.kind, id),
            }
        }
        delivered
    }
}

/// Named, replaceable subscriptions for the four consumer-facing event kinds.
///
/// Registering under an existing id replaces that subscriber's handler. Dispatch
/// iterates over a snapshot, so handlers may register or unregister (themselves
/// included) while being invoked, and a panicking handler does not stop the rest.
pub struct CallbackRegistry {
    vehicle: HandlerMap<VehicleEvent>,
    status: HandlerMap<ParkingStatus>,
    connection: HandlerMap<bool>,
    notification: HandlerMap<NotificationItem>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            vehicle: HandlerMap::new(CallbackKind::Vehicle),
            status: HandlerMap::new(CallbackKind::Status),
            connection: HandlerMap::new(CallbackKind::Connection),
            notification: HandlerMap::new(CallbackKind::Notification),
        }
    }

    pub fn register_vehicle<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(&VehicleEvent) + Send + Sync + 'static,
    {
        self.register(&self.vehicle, id.into(), Arc::new(handler));
    }

    pub fn register_status<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(&ParkingStatus) + Send + Sync + 'static,
    {
        self.register(&self.status, id.into(), Arc::new(handler));
    }

    /// `true` means connected, `false` means offline or reconnecting.
    pub fn register_connection<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.register(&self.connection, id.into(), Arc::new(handler));
    }

    pub fn register_notification<F>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(&NotificationItem) + Send + Sync + 'static,
    {
        self.register(&self.notification, id.into(), Arc::new(handler));
    }

    fn register<T>(&self, map: &HandlerMap<T>, id: String, handler: Handler<T>) {
        if map.insert(id.clone(), handler) {
            tracing::debug!("Replaced {:?} callback '{}'", map.kind, id);
        } else {
            tracing::debug!("Registered {:?} callback '{}'", map.kind, id);
        }
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unregister(&self, id: &str, kind: CallbackKind) {
        let removed = match kind {
            CallbackKind::Vehicle => self.vehicle.remove(id),
            CallbackKind::Status => self.status.remove(id),
            CallbackKind::Connection => self.connection.remove(id),
            CallbackKind::Notification => self.notification.remove(id),
        };
        if removed {
            tracing::debug!("Unregistered {:?} callback '{}'", kind, id);
        }
    }

    pub fn dispatch_vehicle(&self, event: &VehicleEvent) -> usize {
        self.vehicle.dispatch(event)
    }

    pub fn dispatch_status(&self, status: &ParkingStatus) -> usize {
        self.status.dispatch(status)
    }

    pub fn dispatch_connection(&self, connected: bool) -> usize {
        self.connection.dispatch(&connected)
    }

    pub fn dispatch_notification(&self, item: &NotificationItem) -> usize {
        self.notification.dispatch(item)
    }

    pub fn ids(&self, kind: CallbackKind) -> Vec<String> {
        match kind {
            CallbackKind::Vehicle => self.vehicle.ids(),
            CallbackKind::Status => self.status.ids(),
            CallbackKind::Connection => self.connection.ids(),
            CallbackKind::Notification => self.notification.ids(),
        }
    }

    /// Total number of subscriptions across all kinds
    pub fn len(&self) -> usize {
        self.vehicle.len() + self.status.len() + self.connection.len() + self.notification.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.vehicle.clear();
        self.status.clear();
        self.connection.clear();
        self.notification.clear();
    }

    /// Adapter for poller results: successes fan out to Status subscribers,
    /// failures are logged.
    pub fn status_sink(
        self: &Arc<Self>,
    ) -> impl Fn(Result<ParkingStatus, RealtimeError>) + Send + Sync + 'static {
        let registry = Arc::clone(self);
        move |result| match result {
            Ok(status) => {
                registry.dispatch_status(&status);
            }
            Err(e) => tracing::warn!("Status poll failed: {}", e),
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_reregistering_same_id_replaces_handler() {
        let registry = CallbackRegistry::new();
        let first = counter();
        let second = counter();

        let f = Arc::clone(&first);
        registry.register_connection("main", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&second);
        registry.register_connection("main", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch_connection(true), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_unregister_sequence_keeps_latest() {
        let registry = CallbackRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        for round in 0..5 {
            let h = Arc::clone(&hits);
            registry.register_connection("ui", move |_| h.lock().unwrap().push(round));
            if round % 2 == 1 {
                registry.unregister("ui", CallbackKind::Connection);
            }
        }

        registry.dispatch_connection(false);
        assert_eq!(*hits.lock().unwrap(), vec![4]);
    }

    #[test]
    fn test_unregister_unknown_id_is_noop() {
        let registry = CallbackRegistry::new();
        registry.unregister("nobody", CallbackKind::Vehicle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kinds_are_independent() {
        let registry = CallbackRegistry::new();
        registry.register_connection("a", |_| {});
        registry.register_notification("a", |_| {});

        registry.unregister("a", CallbackKind::Connection);
        assert!(registry.ids(CallbackKind::Connection).is_empty());
        assert_eq!(registry.ids(CallbackKind::Notification), vec!["a".to_string()]);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let registry = CallbackRegistry::new();
        let hits = counter();

        registry.register_connection("broken", |_| panic!("handler bug"));
        for id in ["one", "two"] {
            let h = Arc::clone(&hits);
            registry.register_connection(id, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.dispatch_connection(true), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        // Registry is still usable after the panic
        assert_eq!(registry.dispatch_connection(false), 2);
    }

    #[test]
    fn test_handler_may_mutate_registry_during_dispatch() {
        let registry = Arc::new(CallbackRegistry::new());
        let hits = counter();

        let weak = Arc::downgrade(&registry);
        let h = Arc::clone(&hits);
        registry.register_connection("once", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(registry) = weak.upgrade() {
                registry.unregister("once", CallbackKind::Connection);
                registry.register_connection("late", |_| {});
            }
        });

        assert_eq!(registry.dispatch_connection(true), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ids(CallbackKind::Connection), vec!["late".to_string()]);
    }

    #[test]
    fn test_status_sink_forwards_only_successes() {
        let registry = Arc::new(CallbackRegistry::new());
        let hits = counter();
        let h = Arc::clone(&hits);
        registry.register_status("ui", move |status| {
            assert_eq!(status.snapshot.total, 5);
            h.fetch_add(1, Ordering::SeqCst);
        });

        let sink = registry.status_sink();
        sink(Ok(ParkingStatus {
            snapshot: crate::types::ParkingSnapshot {
                total: 5,
                available: 5,
                occupied: 0,
                percentage_full: 0.0,
            },
            status_message: "ok".to_string(),
            last_updated: String::new(),
            color_indicator: "green".to_string(),
        }));
        sink(Err(RealtimeError::HttpStatus(500)));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
