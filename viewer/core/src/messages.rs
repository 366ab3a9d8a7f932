//! Inbound Envelope Decoding
//!
//! The relay wraps every structured message in a `{ "type": ..., "data": ... }`
//! envelope. Payloads that are not an envelope are raw video frames (the
//! broadcaster pushes base64 image data straight through).
//!
//! # Rules
//!
//! - A JSON object with a string `type` is an envelope. Its `data` is the
//!   payload; when `data` is absent or `null`, the whole envelope is.
//! - Anything else that arrives as text is a `frame`, delivered verbatim.
//! - Binary payloads are decoded as UTF-8 envelopes when possible and
//!   otherwise dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EventKind, StreamEvent};

/// Structured wrapper multiplexing event kinds over one socket
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Build an envelope
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Try to read an envelope out of a parsed JSON value
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let event_type = object.get("type")?.as_str()?.to_string();
        let data = object.get("data").filter(|d| !d.is_null()).cloned();
        Some(Self { event_type, data })
    }

    /// Convert to the event published to subscribers
    ///
    /// `original` is the full parsed message, used when `data` is missing.
    fn into_event(self, original: Value) -> StreamEvent {
        let payload = self.data.unwrap_or(original);
        match EventKind::from_name(&self.event_type) {
            EventKind::Connected => StreamEvent::Connected,
            EventKind::Disconnected => StreamEvent::Disconnected,
            EventKind::Frame => StreamEvent::Frame(match payload {
                Value::String(encoded) => encoded,
                other => other.to_string(),
            }),
            EventKind::Analysis => StreamEvent::Analysis(payload),
            EventKind::SessionCompleted => StreamEvent::SessionCompleted(payload),
            EventKind::Error => StreamEvent::error(error_message(&payload)),
            EventKind::Other(event_type) => StreamEvent::Other {
                event_type,
                data: payload,
            },
        }
    }
}

/// Pull a readable message out of an error payload
fn error_message(payload: &Value) -> String {
    match payload {
        Value::String(message) => message.clone(),
        Value::Object(object) => match object.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => payload.to_string(),
        },
        other => other.to_string(),
    }
}

/// Decode a text message into exactly one event
#[must_use]
pub fn decode_text(text: &str) -> StreamEvent {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(envelope) = Envelope::from_value(&value) {
            return envelope.into_event(value);
        }
    }

    if text.trim_start().starts_with('{') {
        tracing::warn!(
            len = text.len(),
            "Payload looks like a malformed envelope; treating as frame"
        );
    }
    StreamEvent::Frame(text.to_string())
}

/// Decode a binary message
///
/// Returns `None` when the bytes are neither UTF-8 nor an envelope.
#[must_use]
pub fn decode_binary(bytes: &[u8]) -> Option<StreamEvent> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value = serde_json::from_str::<Value>(text).ok()?;
    let envelope = Envelope::from_value(&value)?;
    Some(envelope.into_event(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_analysis_envelope() {
        let event = decode_text(r#"{"type":"analysis","data":{"confidence":0.92}}"#);
        assert_eq!(event, StreamEvent::Analysis(json!({"confidence": 0.92})));
    }

    #[test]
    fn test_frame_envelope_keeps_string() {
        let event = decode_text(r#"{"type":"frame","data":"iVBORw0KGgo="}"#);
        assert_eq!(event, StreamEvent::Frame("iVBORw0KGgo=".into()));
    }

    #[test]
    fn test_raw_text_is_frame() {
        let raw = "/9j/4AAQSkZJRgABAQAAAQABAAD";
        assert_eq!(decode_text(raw), StreamEvent::Frame(raw.into()));
    }

    #[test]
    fn test_truncated_json_is_frame() {
        let raw = r#"{"type":"analysis","data":{"conf"#;
        assert_eq!(decode_text(raw), StreamEvent::Frame(raw.into()));
    }

    #[test]
    fn test_json_without_type_is_frame() {
        let raw = r#"{"data":1}"#;
        assert_eq!(decode_text(raw), StreamEvent::Frame(raw.into()));
    }

    #[test]
    fn test_missing_data_falls_back_to_envelope() {
        let event = decode_text(r#"{"type":"session_completed","session_id":"s1"}"#);
        assert_eq!(
            event,
            StreamEvent::SessionCompleted(json!({"type": "session_completed", "session_id": "s1"}))
        );
    }

    #[test]
    fn test_null_data_falls_back_to_envelope() {
        let event = decode_text(r#"{"type":"analysis","data":null}"#);
        assert_eq!(
            event,
            StreamEvent::Analysis(json!({"type": "analysis", "data": null}))
        );
    }

    #[test]
    fn test_falsy_data_is_kept() {
        let event = decode_text(r#"{"type":"analysis","data":0}"#);
        assert_eq!(event, StreamEvent::Analysis(json!(0)));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            decode_text(r#"{"type":"error","data":{"message":"camera lost"}}"#),
            StreamEvent::error("camera lost")
        );
        assert_eq!(
            decode_text(r#"{"type":"error","data":"relay overloaded"}"#),
            StreamEvent::error("relay overloaded")
        );
    }

    #[test]
    fn test_unknown_type_is_other() {
        let event = decode_text(r#"{"type":"stats","data":{"fps":24}}"#);
        assert_eq!(
            event,
            StreamEvent::Other {
                event_type: "stats".into(),
                data: json!({"fps": 24}),
            }
        );
    }

    #[test]
    fn test_binary_envelope() {
        let bytes = br#"{"type":"analysis","data":{"ok":true}}"#;
        assert_eq!(
            decode_binary(bytes),
            Some(StreamEvent::Analysis(json!({"ok": true})))
        );
        assert_eq!(decode_binary(&[0xff, 0xd8, 0xff, 0xe0]), None);
    }
}
