//! Change channel message vocabulary
//!
//! Every frame is a JSON object tagged by `type`.
//!
//! ```json
//! // client -> server
//! {"type": "cursor_position", "position": {"x": 12, "y": 40}}
//!
//! // server -> client
//! {"type": "element_added", "canvas_id": "...", "element": {...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canvas::{Canvas, CanvasElement};

/// Message received from a client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Free-form element change, relayed only when sent by the owner
    ElementUpdate {
        #[serde(default)]
        data: Value,
    },
    /// Pointer location, relayed to everyone else on the canvas
    CursorPosition {
        #[serde(default)]
        position: Value,
    },
    /// Keep-alive, answered with `pong`
    Ping,
    /// Any other `type`
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame; `None` for malformed JSON
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Message sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Canvas fields changed
    CanvasUpdate { canvas_id: String, data: Canvas },
    ElementAdded {
        canvas_id: String,
        element: CanvasElement,
    },
    ElementUpdated {
        canvas_id: String,
        element: CanvasElement,
    },
    ElementDeleted {
        canvas_id: String,
        element_id: String,
        element: CanvasElement,
    },
    /// The canvas is gone; the connection closes after this
    CanvasDeleted { canvas_id: String },
    UserDisconnected { user_id: String },
    /// Relayed `element_update` from the owner
    ElementUpdate { user_id: String, data: Value },
    /// Relayed `cursor_position`
    CursorPosition { user_id: String, position: Value },
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
