use crate::types::{VehicleAction, VehicleEvent};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Recently dispatched (plate, action) pairs.
///
/// The server can deliver one physical vehicle movement twice (broadcast plus the
/// vehicle room). A repeat of the same plate and action inside the window is treated
/// as the same movement. This is a proximity heuristic, not an idempotency key: two
/// genuine movements of one vehicle inside the window collapse into one.
#[derive(Debug)]
pub struct RecentVehicleEvents {
    window: Duration,
    seen: VecDeque<(String, VehicleAction, Instant)>,
}

impl RecentVehicleEvents {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: VecDeque::new(),
        }
    }

    /// Records the event and reports whether it repeats one inside the window.
    ///
    /// A zero window disables the check.
    pub fn is_duplicate(&mut self, event: &VehicleEvent) -> bool {
        if self.window.is_zero() {
            return false;
        }

        let now = Instant::now();
        while let Some((_, _, at)) = self.seen.front() {
            if now.duration_since(*at) >= self.window {
                self.seen.pop_front();
            } else {
                break;
            }
        }

        let plate = event.plate_number.to_uppercase();
        let repeated = self
            .seen
            .iter()
            .any(|(seen_plate, action, _)| *seen_plate == plate && *action == event.action);

        if !repeated {
            self.seen.push_back((plate, event.action, now));
        }
        repeated
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(plate: &str, action: VehicleAction) -> VehicleEvent {
        VehicleEvent {
            id: "1".to_string(),
            kind: "vehicle_activity".to_string(),
            title: String::new(),
            message: String::new(),
            plate_number: plate.to_string(),
            owner_name: None,
            action,
            timestamp: String::new(),
            parking_duration_minutes: None,
            image_url: None,
            entry_time: None,
            exit_time: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_inside_window_is_duplicate() {
        let mut recent = RecentVehicleEvents::new(Duration::from_secs(10));
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Entry)));
        assert!(recent.is_duplicate(&event("51f-12345", VehicleAction::Entry)));
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Exit)));
        assert!(!recent.is_duplicate(&event("30A-1", VehicleAction::Entry)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let mut recent = RecentVehicleEvents::new(Duration::from_secs(10));
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Entry)));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Entry)));
    }

    #[test]
    fn test_zero_window_disables_check() {
        let mut recent = RecentVehicleEvents::new(Duration::ZERO);
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Entry)));
        assert!(!recent.is_duplicate(&event("51F-12345", VehicleAction::Entry)));
    }
}
