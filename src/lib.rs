//! Atelier - collaborative canvas gateway
//!
//! Atelier keeps canvases in memory and pushes every change to the people
//! looking at them over WebSocket.
//!
//! ## Components
//!
//! - **Store**: canvases and their elements, with one lock per canvas
//! - **Hub**: which live connections listen on which canvas
//! - **Gate**: bearer tokens to identities, identities to access tiers
//! - **Channel**: the per-canvas WebSocket feed
//! - **Server**: hyper HTTP/1.1 surface tying it all together

pub mod auth;
pub mod canvas;
pub mod channel;
pub mod config;
pub mod hub;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{AtelierError, Result};
