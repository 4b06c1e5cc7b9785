//! Shared types

pub mod error;

pub use error::{AtelierError, Result};

/// Free-form JSON object used for canvas metadata and element content/style
pub type Payload = serde_json::Map<String, serde_json::Value>;
