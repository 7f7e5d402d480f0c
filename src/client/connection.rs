use serde::Serialize;
use std::fmt;

/// Lifecycle of the live connection. Owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `connect()` call did. The final result of a started attempt is
/// reported through Connection callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A transport open is now in flight
    Started,
    AlreadyConnected,
    /// Another attempt is already in flight
    InProgress,
    /// Called within the throttle window of the previous attempt
    Throttled,
    /// Rejected before opening anything (bad server URL, no identity)
    Aborted(String),
    /// The manager was cleaned up
    ShutDown,
}

/// Snapshot of the manager for diagnostics screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub server_url: String,
    pub reconnect_attempts: u32,
    pub max_attempts: u32,
    pub callbacks_registered: usize,
    pub transport: Option<String>,
    pub socket_id: Option<String>,
    pub millis_since_last_pong: Option<u64>,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_serializes_state_lowercase() {
        let info = ConnectionInfo {
            state: ConnectionState::Connected,
            server_url: "http://192.168.1.6:5000".to_string(),
            reconnect_attempts: 0,
            max_attempts: 10,
            callbacks_registered: 2,
            transport: Some("websocket".to_string()),
            socket_id: Some("abc".to_string()),
            millis_since_last_pong: Some(1200),
            healthy: true,
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["transport"], "websocket");
    }
}
