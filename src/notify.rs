use crate::types::{NotificationItem, VehicleEvent};

/// Presents user-visible alerts (system tray, push banner, ...).
///
/// Called at most once per inbound message, and only while notifications are
/// enabled in the settings.
pub trait LocalNotifier: Send + Sync {
    fn show_vehicle(&self, event: &VehicleEvent);

    fn show(&self, item: &NotificationItem);
}

/// Notifier that writes alerts to the log. Used when no presentation layer is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LocalNotifier for LogNotifier {
    fn show_vehicle(&self, event: &VehicleEvent) {
        tracing::info!(
            plate = %event.plate_number,
            action = event.action.as_str(),
            "{}: {}",
            event.alert_title(),
            event.alert_body()
        );
    }

    fn show(&self, item: &NotificationItem) {
        tracing::info!(kind = ?item.kind, priority = ?item.priority, "{}: {}", item.title, item.message);
    }
}
