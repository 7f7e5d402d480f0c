use serde::{Deserialize, Serialize};

/// Vehicle identity the connection authenticates with.
///
/// Supplied by the login/session layer; the manager only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub plate_number: String,
    pub owner_phone: String,
}

impl Identity {
    pub fn new(plate_number: impl Into<String>, owner_phone: impl Into<String>) -> Self {
        Self {
            plate_number: plate_number.into(),
            owner_phone: owner_phone.into(),
        }
    }
}

/// Authentication payload attached to the transport connect request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub plate_number: String,
    pub owner_phone: String,
    pub client_type: String,
    pub timestamp: String,
}

impl AuthPayload {
    pub fn new(identity: &Identity, client_type: &str) -> Self {
        Self {
            plate_number: identity.plate_number.clone(),
            owner_phone: identity.owner_phone.clone(),
            client_type: client_type.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleAction {
    Entry,
    Exit,
}

impl VehicleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

/// A vehicle entering or leaving the car park.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleEvent {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub plate_number: String,
    pub owner_name: Option<String>,
    pub action: VehicleAction,
    /// ISO-8601 as sent by the server
    pub timestamp: String,
    pub parking_duration_minutes: Option<u32>,
    pub image_url: Option<String>,
    pub entry_time: Option<String>,
    pub exit_time: Option<String>,
}

impl VehicleEvent {
    /// Parking duration rendered as `"2h 5m"` / `"45m"`.
    pub fn formatted_duration(&self) -> Option<String> {
        self.parking_duration_minutes.map(format_duration)
    }

    /// Title for the local notification
    pub fn alert_title(&self) -> &'static str {
        match self.action {
            VehicleAction::Entry => "Vehicle entered the car park",
            VehicleAction::Exit => "Vehicle left the car park",
        }
    }

    /// Body for the local notification
    pub fn alert_body(&self) -> String {
        let mut body = format!("Vehicle {}", self.plate_number);
        if let Some(owner) = self.owner_name.as_deref().filter(|name| !name.is_empty()) {
            body.push_str(&format!(" ({owner})"));
        }
        body.push_str(match self.action {
            VehicleAction::Entry => " entered the car park",
            VehicleAction::Exit => " left the car park",
        });
        if let Some(minutes) = self.parking_duration_minutes.filter(|m| *m > 0) {
            body.push_str(&format!("\nParked for {}", format_duration(minutes)));
        }
        body
    }
}

pub fn format_duration(minutes: u32) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

/// Occupancy reading at one instant. Counts are floored at zero and the
/// percentage is clamped into `[0, 100]` on decode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ParkingSnapshot {
    pub total: u32,
    pub available: u32,
    pub occupied: u32,
    pub percentage_full: f64,
}

impl ParkingSnapshot {
    pub fn has_space(&self) -> bool {
        self.available > 0
    }
}

/// Snapshot plus the presentation fields the server sends alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParkingStatus {
    pub snapshot: ParkingSnapshot,
    pub status_message: String,
    pub last_updated: String,
    pub color_indicator: String,
}

/// Answer of the quick-status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickStatus {
    #[serde(default)]
    pub available: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub has_space: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ParkingFull,
    SpaceAvailable,
    SpaceLimited,
    SpaceFull,
    WrongPosition,
    PositionCorrect,
    OverstayWarning,
    SystemUpdate,
    SystemMaintenance,
    ConnectionLost,
    ConnectionRestored,
    UrgentAlert,
    VehicleEntered,
    VehicleExited,
    PaymentDue,
    PaymentSuccess,
    SecurityAlert,
    WeatherAlert,
    Promotion,
    News,
    Reminder,
}

impl NotificationKind {
    /// Case-insensitive; unknown names map to `SystemUpdate`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "parking_full" => Self::ParkingFull,
            "space_available" => Self::SpaceAvailable,
            "space_limited" => Self::SpaceLimited,
            "space_full" => Self::SpaceFull,
            "wrong_position" => Self::WrongPosition,
            "position_correct" => Self::PositionCorrect,
            "overstay_warning" => Self::OverstayWarning,
            "system_maintenance" => Self::SystemMaintenance,
            "connection_lost" => Self::ConnectionLost,
            "connection_restored" => Self::ConnectionRestored,
            "urgent_alert" => Self::UrgentAlert,
            "vehicle_entered" => Self::VehicleEntered,
            "vehicle_exited" => Self::VehicleExited,
            "payment_due" => Self::PaymentDue,
            "payment_success" => Self::PaymentSuccess,
            "security_alert" => Self::SecurityAlert,
            "weather_alert" => Self::WeatherAlert,
            "promotion" => Self::Promotion,
            "news" => Self::News,
            "reminder" => Self::Reminder,
            _ => Self::SystemUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    /// Unknown values map to `Normal`.
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Self::Low,
            3 => Self::High,
            4 => Self::Urgent,
            _ => Self::Normal,
        }
    }
}

/// Generic server notification (maintenance, capacity warnings, ...)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationItem {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub important: bool,
}

/// Application lifecycle state reported to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Foreground,
    Background,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}
