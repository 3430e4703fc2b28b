//! mpv JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Global request ID counter for unique command identification.
static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Playlist insertion mode for `loadfile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace the playlist with this entry
    Replace,
    /// Append to the end of the playlist
    Append,
    /// Append and start playing the appended entry
    AppendPlay,
}

impl LoadMode {
    fn as_str(self) -> &'static str {
        match self {
            LoadMode::Replace => "replace",
            LoadMode::Append => "append",
            LoadMode::AppendPlay => "append-play",
        }
    }
}

/// Command sent to mpv via IPC.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
    pub command: Vec<serde_json::Value>,
    pub request_id: i64,
}

impl MpvCommand {
    /// Create a new command with auto-generated request ID.
    pub fn new(args: Vec<serde_json::Value>) -> Self {
        Self {
            command: args,
            request_id: next_request_id(),
        }
    }

    /// Load a file into the playlist.
    pub fn loadfile(path: &str, mode: LoadMode) -> Self {
        Self::new(vec!["loadfile".into(), path.into(), mode.as_str().into()])
    }

    /// Seek to an absolute position in seconds.
    pub fn seek(seconds: f64) -> Self {
        Self::new(vec!["seek".into(), seconds.into(), "absolute".into()])
    }

    /// Set a property to any JSON value.
    pub fn set_property(name: &str, value: impl Into<serde_json::Value>) -> Self {
        Self::new(vec!["set_property".into(), name.into(), value.into()])
    }

    /// Get a property value.
    pub fn get_property(name: &str) -> Self {
        Self::new(vec!["get_property".into(), name.into()])
    }

    /// Observe a property for changes.
    pub fn observe_property(id: i64, name: &str) -> Self {
        Self::new(vec!["observe_property".into(), id.into(), name.into()])
    }

    /// Clear all playlist entries except the playing one.
    pub fn playlist_clear() -> Self {
        Self::new(vec!["playlist-clear".into()])
    }

    /// Remove the currently playing playlist entry.
    pub fn playlist_remove_current() -> Self {
        Self::new(vec!["playlist-remove".into(), "current".into()])
    }

    /// Quit mpv.
    pub fn quit() -> Self {
        Self::new(vec!["quit".into()])
    }
}

/// Response from mpv for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
    /// "success" or error message.
    pub error: String,
    /// Response data (command-specific).
    pub data: Option<serde_json::Value>,
    /// Matching request ID.
    pub request_id: i64,
}

impl MpvResponse {
    pub fn is_success(&self) -> bool {
        self.error == "success"
    }
}

/// Event sent by mpv (property changes, playback events, etc.).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
    /// Event type (e.g., "property-change", "end-file", "file-loaded").
    pub event: String,
    /// Observer ID for property-change events.
    pub id: Option<i64>,
    /// Property name for property-change events.
    pub name: Option<String>,
    /// Event data.
    pub data: Option<serde_json::Value>,
    /// Reason for end-file events (e.g., "eof", "stop", "quit", "error").
    pub reason: Option<String>,
    /// Log level for log-message events.
    pub level: Option<String>,
    /// Log text for log-message events.
    pub text: Option<String>,
}

/// Typed property values from mpv.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    /// Arrays and objects, kept as raw JSON
    Json(serde_json::Value),
    Null,
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => PropertyValue::Bool(b),
            serde_json::Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => PropertyValue::String(s),
            serde_json::Value::Null => PropertyValue::Null,
            other => PropertyValue::Json(other),
        }
    }
}

/// Message received from mpv IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
    Response(MpvResponse),
    Event(MpvEvent),
}

impl MpvMessage {
    /// Parse a JSON line from mpv.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        // Responses carry a request_id; everything else is an event.
        if line.contains("request_id") {
            let response: MpvResponse = serde_json::from_str(line)?;
            Ok(MpvMessage::Response(response))
        } else {
            let event: MpvEvent = serde_json::from_str(line)?;
            Ok(MpvMessage::Event(event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loadfile_serialization() {
        let cmd = MpvCommand::loadfile("/music/track.flac", LoadMode::AppendPlay);
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("loadfile"));
        assert!(json.contains("/music/track.flac"));
        assert!(json.contains("append-play"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = MpvCommand::get_property("pause");
        let b = MpvCommand::get_property("pause");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"error":"success","data":213.4,"request_id":7}"#;
        let msg = MpvMessage::parse(json).unwrap();
        match msg {
            MpvMessage::Response(r) => {
                assert!(r.is_success());
                assert_eq!(r.request_id, 7);
                assert_eq!(r.data.unwrap().as_f64(), Some(213.4));
            }
            _ => panic!("Expected response"),
        }
    }

    #[test]
    fn test_event_parsing() {
        let json = r#"{"event":"end-file","reason":"eof"}"#;
        let msg = MpvMessage::parse(json).unwrap();
        match msg {
            MpvMessage::Event(e) => {
                assert_eq!(e.event, "end-file");
                assert_eq!(e.reason.as_deref(), Some("eof"));
            }
            _ => panic!("Expected event"),
        }
    }

    #[test]
    fn test_property_change_parsing() {
        let json = r#"{"event":"property-change","id":1,"name":"pause","data":false}"#;
        let msg = MpvMessage::parse(json).unwrap();
        match msg {
            MpvMessage::Event(e) => {
                assert_eq!(e.name.as_deref(), Some("pause"));
                assert_eq!(
                    e.data.map(PropertyValue::from),
                    Some(PropertyValue::Bool(false))
                );
            }
            _ => panic!("Expected event"),
        }
    }

    #[test]
    fn test_property_value_accessors() {
        assert_eq!(PropertyValue::Number(3.0).as_i64(), Some(3));
        assert_eq!(PropertyValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::Null.as_f64(), None);
        assert_eq!(
            PropertyValue::String("path".into()).as_str(),
            Some("path")
        );
    }
}
