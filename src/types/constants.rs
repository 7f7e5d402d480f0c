/// Events the client emits (magic strings layer)
pub mod outbound_events {
    pub const JOIN_VEHICLE_ROOM: &str = "join_vehicle_room";
    pub const REQUEST_PARKING_STATUS: &str = "request_parking_status";
    pub const PING: &str = "ping";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const APP_STATE_CHANGE: &str = "app_state_change";
    pub const CLIENT_DISCONNECT: &str = "client_disconnect";
    pub const TEST_CONNECTION: &str = "test_connection";
}

/// Events pushed by the server (magic strings layer)
pub mod inbound_events {
    pub const VEHICLE_NOTIFICATION: &str = "vehicle_notification";
    pub const PARKING_STATUS_UPDATE: &str = "parking_status_update";
    pub const NOTIFICATION: &str = "notification";
    pub const ROOM_JOINED: &str = "room_joined";
    pub const JOINED_ROOM: &str = "joined_room";
    pub const SYSTEM_INFO: &str = "system_info";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const HEARTBEAT_ACK: &str = "heartbeat_ack";
    pub const TEST_MESSAGE: &str = "test_message";
    pub const ILLEGAL_PARKING_EVENT: &str = "illegal_parking_event";
}

/// Socket.IO disconnect reasons as reported by the server side
pub mod disconnect_reasons {
    pub const SERVER_DISCONNECT: &str = "io server disconnect";
    pub const CLIENT_DISCONNECT: &str = "io client disconnect";
    pub const TRANSPORT_CLOSE: &str = "transport close";
    pub const TRANSPORT_ERROR: &str = "transport error";
    pub const PING_TIMEOUT: &str = "ping timeout";
}

/// Transport names, in preference order
pub const TRANSPORT_WEBSOCKET: &str = "websocket";
pub const TRANSPORT_POLLING: &str = "polling";

/// Engine.IO protocol revision spoken by the transports
pub const ENGINE_IO_VERSION: &str = "4";

/// Path the Socket.IO server is mounted on
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Tag sent with every outbound event; the server groups mobile clients by it
pub const DEFAULT_CLIENT_TYPE: &str = "android";

pub const DEFAULT_APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness ping interval (milliseconds)
pub const PING_INTERVAL: u64 = 30_000;

/// Transport connect timeout (milliseconds)
pub const CONNECTION_TIMEOUT: u64 = 15_000;

/// Minimum spacing between two connect attempts (milliseconds)
pub const CONNECT_THROTTLE: u64 = 2_000;

/// Reconnect policy (milliseconds unless noted)
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const INITIAL_RECONNECT_DELAY: u64 = 2_000;
pub const RECONNECT_DELAY: u64 = 5_000;
pub const MAX_BACKOFF_EXPONENT: u32 = 6;
pub const MAX_RECONNECT_JITTER: u64 = 1_000;
pub const FORCE_RECONNECT_DELAY: u64 = 1_000;

/// Window in which a repeated (plate, action) vehicle event counts as a duplicate (milliseconds)
pub const DUPLICATE_WINDOW: u64 = 10_000;

/// HTTP fallback
pub const STATUS_REFRESH_INTERVAL: u64 = 30_000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 10_000;
pub const HTTP_READ_TIMEOUT: u64 = 15_000;
pub const HTTP_USER_AGENT: &str = "ParkingApp/1.0";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const PARKING_SUMMARY_PATH: &str = "/api/mobile/parking-summary";
pub const QUICK_STATUS_PATH: &str = "/api/mobile/quick-status";

/// Notification text limits
pub const MAX_NOTIFICATION_TITLE: usize = 100;
pub const MAX_NOTIFICATION_MESSAGE: usize = 500;
