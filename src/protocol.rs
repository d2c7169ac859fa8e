//! Viewer Protocol
//!
//! JSON messages between a shared session and the viewers attached to it.
//! The session sends events, viewers send commands. The transport that
//! carries these strings (a WebSocket in production) lives outside this crate.
//!
//! Example:
//! ```json
//! {"type": "output", "data": "You see a lantern here.\r\n"}
//! {"type": "input", "data": "get lantern\r"}
//! ```

use serde::{Deserialize, Serialize};

/// Events from a shared session to a viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerEvent {
    /// Terminal output, always whole UTF-8 characters
    Output { data: String },

    /// The viewer fell behind and missed this many events
    Lagged { dropped: u64 },

    /// The session's process ended
    Closed { reason: String },
}

/// Commands from a viewer to a shared session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerCommand {
    /// Keystrokes for the session's process
    Input { data: String },

    /// Leave the session
    Detach,
}

/// Parse a command from JSON
pub fn parse_viewer_command(json: &str) -> Result<ViewerCommand, serde_json::Error> {
    serde_json::from_str(json)
}

/// Serialize an event to JSON
pub fn serialize_event(event: &ViewerEvent) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"type":"closed","reason":"Serialization failed"}"#.to_string())
}
