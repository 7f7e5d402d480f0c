//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the default namespace and text packets are supported; binary attachments
//! are rejected as protocol errors.

use crate::types::{EventMessage, RealtimeError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Separator between packets in one long-polling payload
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Handshake sent by the server in the engine `open` packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Engine.IO transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::Protocol("empty engine packet".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body).map_err(|e| {
                RealtimeError::Protocol(format!("invalid open handshake: {e}"))
            })?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(RealtimeError::Protocol(format!(
                "unknown engine packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send `open`; encode as the bare type for completeness.
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }

    /// Splits a long-polling payload into packets.
    pub fn parse_payload(payload: &str) -> Result<Vec<Self>> {
        payload
            .split(RECORD_SEPARATOR)
            .filter(|chunk| !chunk.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Socket.IO packet carried inside an engine `message`
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event(EventMessage),
    Ack,
    ConnectError(String),
}

impl SocketPacket {
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RealtimeError::Protocol("empty socket packet".to_string()))?;
        let mut rest = chars.as_str();

        // Namespace other than "/" is prefixed as "/name,"
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(index) => &rest[index + 1..],
                None => "",
            };
        }
        // Optional ack id
        let data = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        match kind {
            '0' => Ok(Self::Connect(parse_optional_json(data)?)),
            '1' => Ok(Self::Disconnect),
            '2' => parse_event(data).map(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => {
                let message = match parse_optional_json(data)? {
                    Some(Value::Object(map)) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("connection refused")
                        .to_string(),
                    Some(Value::String(message)) => message,
                    _ => "connection refused".to_string(),
                };
                Ok(Self::ConnectError(message))
            }
            '5' | '6' => Err(RealtimeError::Protocol(
                "binary socket packets are not supported".to_string(),
            )),
            other => Err(RealtimeError::Protocol(format!(
                "unknown socket packet type '{other}'"
            ))),
        }
    }

    /// Encodes the socket packet (without the engine `4` prefix).
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Self::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
            Self::Connect(None) => "0".to_string(),
            Self::Disconnect => "1".to_string(),
            Self::Event(message) => format!(
                "2{}",
                serde_json::to_string(&Value::Array(vec![
                    Value::String(message.event.as_str().to_string()),
                    message.payload.clone(),
                ]))?
            ),
            Self::Ack => "3".to_string(),
            Self::ConnectError(message) => {
                format!("4{}", serde_json::json!({ "message": message }))
            }
        })
    }

    /// Encodes as a complete engine `message` frame.
    pub fn to_frame(&self) -> Result<String> {
        Ok(EnginePacket::Message(self.encode()?).encode())
    }
}

fn parse_optional_json(data: &str) -> Result<Option<Value>> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(data)
        .map(Some)
        .map_err(|e| RealtimeError::Protocol(format!("invalid packet data: {e}")))
}

fn parse_event(data: &str) -> Result<EventMessage> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| RealtimeError::Protocol(format!("invalid event packet: {e}")))?;
    let Value::Array(mut items) = value else {
        return Err(RealtimeError::Protocol(
            "event packet is not an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(RealtimeError::Protocol("event packet has no name".to_string()));
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(RealtimeError::Protocol(format!(
                "event name must be a string, got {other}"
            )));
        }
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };
    Ok(EventMessage::new(name, payload))
}
