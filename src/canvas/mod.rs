//! Canvas documents and their elements
//!
//! A canvas is the shared, ownable unit of collaborative state. Elements are
//! positioned, sized, typed sub-objects owned by exactly one canvas.
//!
//! - `store` keeps canvases in memory together with their per-canvas locks
//! - `service` composes authorization, locking, mutation and broadcast

pub mod service;
pub mod store;

pub use service::CanvasService;
pub use store::{CanvasLock, CanvasStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use crate::types::{AtelierError, Payload, Result};

/// Generate a fresh opaque identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Advance `stamp` to now without ever moving it backwards
fn advance(stamp: &mut DateTime<Utc>) {
    let now = Utc::now();
    if now > *stamp {
        *stamp = now;
    }
}

/// Element position on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Element extents
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    #[serde(alias = "w")]
    pub width: f64,
    #[serde(alias = "h")]
    pub height: f64,
}

/// A positioned, typed object embedded in a canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasElement {
    pub id: String,
    /// Free-form type tag (image, text, shape, ...)
    #[serde(rename = "type")]
    pub element_type: String,
    pub position: Position,
    pub size: Size,
    pub content: Payload,
    #[serde(default)]
    pub style: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanvasElement {
    /// Build an element with a fresh id and timestamps
    pub fn from_new(new: NewElement) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            element_type: new.element_type,
            position: new.position,
            size: new.size,
            content: new.content,
            style: new.style.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields present in `patch`
    pub fn apply(&mut self, patch: ElementPatch) {
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
        advance(&mut self.updated_at);
    }
}

/// Request to add an element
#[derive(Debug, Clone, Deserialize)]
pub struct NewElement {
    #[serde(rename = "type", alias = "element_type")]
    pub element_type: String,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub content: Payload,
    #[serde(default)]
    pub style: Option<Payload>,
}

/// Partial element update; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementPatch {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub content: Option<Payload>,
    pub style: Option<Payload>,
}

/// A collaborative document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub id: String,
    pub name: String,
    pub elements: Vec<CanvasElement>,
    pub metadata: Payload,
    pub owner_id: String,
    pub shared_with: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Canvas {
    pub fn new(name: String, owner_id: String, metadata: Payload) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name,
            elements: Vec::new(),
            metadata,
            owner_id,
            shared_with: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_shared_with(&self, identity_id: &str) -> bool {
        self.shared_with.contains(identity_id)
    }

    /// Record a successful mutation
    pub fn touch(&mut self) {
        advance(&mut self.updated_at);
    }

    /// Apply the fields present in `patch`
    ///
    /// Fails without changing anything if the replacement element list
    /// repeats an id.
    pub fn apply(&mut self, patch: CanvasPatch) -> Result<()> {
        if let Some(elements) = &patch.elements {
            let mut seen = HashSet::with_capacity(elements.len());
            if let Some(dup) = elements.iter().find(|e| !seen.insert(e.id.as_str())) {
                return Err(AtelierError::BadRequest(format!(
                    "Duplicate element id {}",
                    dup.id
                )));
            }
        }

        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(elements) = patch.elements {
            self.elements = elements;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
        self.touch();
        Ok(())
    }
}

/// Partial canvas update; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CanvasPatch {
    pub name: Option<String>,
    pub elements: Option<Vec<CanvasElement>>,
    pub metadata: Option<Payload>,
}
