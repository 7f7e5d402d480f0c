use crate::types::constants::{inbound_events, outbound_events};
use serde::{Deserialize, Serialize};

/// Type-safe event names carried on the event stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SocketEvent {
    /// Server pushes
    VehicleNotification,
    ParkingStatusUpdate,
    Notification,
    RoomJoined,
    SystemInfo,
    Pong,
    Error,

    /// Client emits
    JoinVehicleRoom,
    RequestParkingStatus,
    Ping,
    Heartbeat,
    AppStateChange,
    ClientDisconnect,
    TestConnection,

    /// Anything else (debug and telemetry kinds included)
    Custom(String),
}

impl SocketEvent {
    /// Parse a string into a SocketEvent
    pub fn parse(s: &str) -> Self {
        match s {
            inbound_events::VEHICLE_NOTIFICATION => Self::VehicleNotification,
            inbound_events::PARKING_STATUS_UPDATE => Self::ParkingStatusUpdate,
            inbound_events::NOTIFICATION => Self::Notification,
            inbound_events::ROOM_JOINED => Self::RoomJoined,
            inbound_events::SYSTEM_INFO => Self::SystemInfo,
            inbound_events::PONG => Self::Pong,
            inbound_events::ERROR => Self::Error,
            outbound_events::JOIN_VEHICLE_ROOM => Self::JoinVehicleRoom,
            outbound_events::REQUEST_PARKING_STATUS => Self::RequestParkingStatus,
            outbound_events::PING => Self::Ping,
            outbound_events::HEARTBEAT => Self::Heartbeat,
            outbound_events::APP_STATE_CHANGE => Self::AppStateChange,
            outbound_events::CLIENT_DISCONNECT => Self::ClientDisconnect,
            outbound_events::TEST_CONNECTION => Self::TestConnection,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Convert event to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::VehicleNotification => inbound_events::VEHICLE_NOTIFICATION,
            Self::ParkingStatusUpdate => inbound_events::PARKING_STATUS_UPDATE,
            Self::Notification => inbound_events::NOTIFICATION,
            Self::RoomJoined => inbound_events::ROOM_JOINED,
            Self::SystemInfo => inbound_events::SYSTEM_INFO,
            Self::Pong => inbound_events::PONG,
            Self::Error => inbound_events::ERROR,
            Self::JoinVehicleRoom => outbound_events::JOIN_VEHICLE_ROOM,
            Self::RequestParkingStatus => outbound_events::REQUEST_PARKING_STATUS,
            Self::Ping => outbound_events::PING,
            Self::Heartbeat => outbound_events::HEARTBEAT,
            Self::AppStateChange => outbound_events::APP_STATE_CHANGE,
            Self::ClientDisconnect => outbound_events::CLIENT_DISCONNECT,
            Self::TestConnection => outbound_events::TEST_CONNECTION,
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for SocketEvent {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for SocketEvent {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<SocketEvent> for String {
    fn from(event: SocketEvent) -> Self {
        match event {
            SocketEvent::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_event_parse() {
        assert_eq!(
            SocketEvent::parse("vehicle_notification"),
            SocketEvent::VehicleNotification
        );
        assert_eq!(
            SocketEvent::parse("parking_status_update"),
            SocketEvent::ParkingStatusUpdate
        );
        assert_eq!(SocketEvent::parse("pong"), SocketEvent::Pong);
        assert_eq!(
            SocketEvent::parse("illegal_parking_event"),
            SocketEvent::Custom("illegal_parking_event".to_string())
        );
    }

    #[test]
    fn test_known_events_keep_their_wire_name() {
        let events = vec![
            SocketEvent::VehicleNotification,
            SocketEvent::ParkingStatusUpdate,
            SocketEvent::Notification,
            SocketEvent::RoomJoined,
            SocketEvent::SystemInfo,
            SocketEvent::Pong,
            SocketEvent::Error,
            SocketEvent::JoinVehicleRoom,
            SocketEvent::RequestParkingStatus,
            SocketEvent::Ping,
            SocketEvent::Heartbeat,
            SocketEvent::AppStateChange,
            SocketEvent::ClientDisconnect,
            SocketEvent::TestConnection,
        ];

        for event in events {
            assert_eq!(SocketEvent::parse(event.as_str()), event);
        }
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&SocketEvent::JoinVehicleRoom).unwrap();
        assert_eq!(json, r#""join_vehicle_room""#);

        let custom: SocketEvent = serde_json::from_str(r#""heartbeat_ack""#).unwrap();
        assert_eq!(custom, SocketEvent::Custom("heartbeat_ack".to_string()));
    }
}
