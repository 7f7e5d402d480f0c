//! Decoding of inbound event payloads into typed domain events.
//!
//! Missing optional fields are filled with defaults and wrong-typed optional fields
//! are treated as missing. A payload that is not an object, or whose required fields
//! are missing or wrong-typed, is rejected with [`RealtimeError::Protocol`] so the
//! caller can log and drop it.

use crate::types::constants::{MAX_NOTIFICATION_MESSAGE, MAX_NOTIFICATION_TITLE};
use crate::types::{
    NotificationItem, NotificationKind, ParkingSnapshot, ParkingStatus, Priority, RealtimeError,
    Result, VehicleAction, VehicleEvent,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::borrow::Cow;

/// Deserializes an optional field, mapping a wrong type to `None` instead of failing.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`lenient`], but also reads numbers sent as strings (`"100"`).
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct RawVehicleNotification {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<Value>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
    plate_number: String,
    #[serde(default, deserialize_with = "lenient")]
    owner_name: Option<String>,
    action: VehicleAction,
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    parking_duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    entry_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    exit_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawParkingInfo {
    #[serde(default, deserialize_with = "lenient_number")]
    total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    available: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    occupied: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    percentage_full: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawParkingStatus {
    #[serde(default, deserialize_with = "lenient")]
    status_message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_updated: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    color_indicator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<Value>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    priority: Option<i64>,
}

/// Accepts an object, or a string holding a JSON object.
fn object_payload<'a>(event: &str, payload: &'a Value) -> Result<Cow<'a, Value>> {
    match payload {
        Value::Object(_) => Ok(Cow::Borrowed(payload)),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed @ Value::Object(_)) => Ok(Cow::Owned(parsed)),
            _ => Err(RealtimeError::Protocol(format!(
                "{event}: string payload is not a JSON object"
            ))),
        },
        other => Err(RealtimeError::Protocol(format!(
            "{event}: expected an object payload, got {}",
            type_name(other)
        ))),
    }
}

fn decode<T: DeserializeOwned>(event: &str, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| RealtimeError::Protocol(format!("{event}: {e}")))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn id_string(id: Option<Value>) -> Option<String> {
    match id? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn clamp_count(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn clamp_percentage(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Decodes a `vehicle_notification` payload.
///
/// `plate_number` (non-empty string) and `action` (`"entry"` / `"exit"`) are required.
pub fn decode_vehicle_event(payload: &Value) -> Result<VehicleEvent> {
    const EVENT: &str = "vehicle_notification";
    let payload = object_payload(EVENT, payload)?;
    let raw: RawVehicleNotification = decode(EVENT, &payload)?;

    let plate_number = raw.plate_number.trim().to_string();
    if plate_number.is_empty() {
        return Err(RealtimeError::Protocol(format!(
            "{EVENT}: empty plate_number"
        )));
    }

    let parking_duration_minutes = raw
        .parking_duration
        .filter(|minutes| minutes.is_finite() && *minutes >= 0.0)
        .map(|minutes| minutes.min(u32::MAX as f64) as u32);

    Ok(VehicleEvent {
        id: id_string(raw.id).unwrap_or_else(|| {
            format!("unknown_{}", chrono::Utc::now().timestamp_millis())
        }),
        kind: raw.kind.unwrap_or_else(|| "vehicle_activity".to_string()),
        title: raw.title.unwrap_or_else(|| "Vehicle activity".to_string()),
        message: raw.message.unwrap_or_default(),
        plate_number,
        owner_name: raw.owner_name.filter(|name| !name.is_empty()),
        action: raw.action,
        timestamp: raw.timestamp.unwrap_or_else(now_iso),
        parking_duration_minutes,
        image_url: raw.image_url.filter(|url| !url.is_empty()),
        entry_time: raw.entry_time.filter(|t| !t.is_empty()),
        exit_time: raw.exit_time.filter(|t| !t.is_empty()),
    })
}

/// Decodes a `parking_status_update` payload (or the `data` block of the HTTP summary).
///
/// Counts are read from the nested `parking_status` object when present, otherwise
/// from the top level. Negative counts floor at zero; the percentage is clamped to `[0, 100]`.
pub fn decode_parking_status(payload: &Value) -> Result<ParkingStatus> {
    const EVENT: &str = "parking_status_update";
    let payload = object_payload(EVENT, payload)?;

    let info: RawParkingInfo = match payload.get("parking_status") {
        Some(nested @ Value::Object(_)) => decode(EVENT, nested)?,
        Some(Value::Null) | None => decode(EVENT, &payload)?,
        Some(other) => {
            return Err(RealtimeError::Protocol(format!(
                "{EVENT}: parking_status must be an object, got {}",
                type_name(other)
            )));
        }
    };
    let raw: RawParkingStatus = decode(EVENT, &payload)?;

    Ok(ParkingStatus {
        snapshot: ParkingSnapshot {
            total: clamp_count(info.total),
            available: clamp_count(info.available),
            occupied: clamp_count(info.occupied),
            percentage_full: clamp_percentage(info.percentage_full),
        },
        status_message: raw.status_message.unwrap_or_else(|| "No status".to_string()),
        last_updated: raw.last_updated.unwrap_or_else(now_iso),
        color_indicator: raw.color_indicator.unwrap_or_else(|| "gray".to_string()),
    })
}

/// Decodes a generic `notification` payload.
pub fn decode_notification(payload: &Value) -> Result<NotificationItem> {
    const EVENT: &str = "notification";
    let payload = object_payload(EVENT, payload)?;
    let raw: RawNotification = decode(EVENT, &payload)?;

    let received_at = chrono::Utc::now();
    let priority = raw.priority.map(Priority::from_level).unwrap_or(Priority::Normal);

    Ok(NotificationItem {
        id: id_string(raw.id).unwrap_or_else(|| received_at.timestamp_millis().to_string()),
        kind: raw
            .kind
            .as_deref()
            .map(NotificationKind::parse)
            .unwrap_or(NotificationKind::SystemUpdate),
        title: truncate(
            raw.title.unwrap_or_else(|| "Notification".to_string()),
            MAX_NOTIFICATION_TITLE,
        ),
        message: truncate(raw.message.unwrap_or_default(), MAX_NOTIFICATION_MESSAGE),
        priority,
        received_at,
        important: priority >= Priority::High,
    })
}
