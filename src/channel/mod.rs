//! Change channel
//!
//! Live per-canvas WebSocket feed. Clients attach to one canvas and receive
//! every change made to it by anyone else, plus relayed cursor movement.
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:8080/api/canvas/ws/{canvas_id}?token=<jwt>`
//!
//! Messages (client → server):
//! - `element_update` - Relayed to the others when sent by the owner
//! - `cursor_position` - Relayed to the others
//! - `ping` - Answered with `pong`
//!
//! Messages (server → client):
//! - `canvas_update`, `element_added`, `element_updated`, `element_deleted`
//! - `canvas_deleted` - Sent before the server closes the connection
//! - `user_disconnected` - Another listener left

pub mod connection;
pub mod dispatch;
pub mod messages;

pub use connection::handle_canvas_ws;
pub use dispatch::ChannelSession;
pub use messages::{ClientMessage, ServerMessage};
