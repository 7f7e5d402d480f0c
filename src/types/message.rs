use serde::{Deserialize, Serialize};

use crate::SocketEvent;

/// One named event on the stream, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMessage {
    pub event: SocketEvent,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventMessage {
    pub fn new(event: impl Into<SocketEvent>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Stamp `timestamp` (epoch millis) and `client_type` onto an object payload.
    ///
    /// Non-object payloads are left untouched.
    pub fn stamped(mut self, client_type: &str) -> Self {
        if let Some(map) = self.payload.as_object_mut() {
            map.entry("timestamp")
                .or_insert_with(|| serde_json::json!(chrono::Utc::now().timestamp_millis()));
            map.entry("client_type")
                .or_insert_with(|| serde_json::json!(client_type));
        }
        self
    }
}
