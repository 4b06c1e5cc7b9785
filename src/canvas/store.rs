//! Canvas store
//!
//! In-memory storage for canvases with per-canvas mutual exclusion.
//!
//! Plain reads (`get`, `list_for`) never take a canvas lock and may observe a
//! snapshot that is about to change. Callers composing a read-modify-write
//! sequence with a broadcast hold the canvas lock from `lock_for` around it.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{Canvas, CanvasElement, CanvasPatch, ElementPatch, NewElement};
use crate::types::{AtelierError, Payload, Result};

/// Exclusive handle serializing compound updates of one canvas
pub type CanvasLock = Arc<tokio::sync::Mutex<()>>;

/// Canvas store with concurrent access
pub struct CanvasStore {
    /// Canvas storage: id -> canvas
    canvases: DashMap<String, Canvas>,
    /// Per-canvas locks, created lazily. The outer mutex only guards the map
    /// itself and is never held across an await.
    locks: Mutex<HashMap<String, CanvasLock>>,
}

impl CanvasStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            canvases: DashMap::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, CanvasLock>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a canvas owned by `owner_id`
    pub fn create(&self, name: String, owner_id: String, metadata: Payload) -> Canvas {
        let canvas = Canvas::new(name, owner_id, metadata);
        self.canvases.insert(canvas.id.clone(), canvas.clone());
        debug!(canvas = %canvas.id, owner = %canvas.owner_id, "Canvas created");
        canvas
    }

    /// Snapshot of a canvas, if it exists
    pub fn get(&self, id: &str) -> Option<Canvas> {
        self.canvases.get(id).map(|entry| entry.value().clone())
    }

    /// Apply a partial update, returning the updated canvas
    ///
    /// A replacement element list with repeated ids is rejected and leaves
    /// the canvas untouched.
    pub fn update(&self, id: &str, patch: CanvasPatch) -> Result<Canvas> {
        let mut canvas = self.get_mut_or_not_found(id)?;
        canvas.apply(patch)?;
        Ok(canvas.clone())
    }

    /// Remove a canvas and its lock entry
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.canvases.remove(id).is_some();
        self.locks().remove(id);
        if removed {
            debug!(canvas = %id, locks = self.lock_count(), "Canvas deleted");
        }
        removed
    }

    /// Every canvas `identity_id` owns or has been shared
    pub fn list_for(&self, identity_id: &str) -> Vec<Canvas> {
        self.canvases
            .iter()
            .filter(|entry| entry.owner_id == identity_id || entry.is_shared_with(identity_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Get or create the lock for a canvas id
    pub fn lock_for(&self, id: &str) -> CanvasLock {
        let mut locks = self.locks();
        Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the lock entry of a canvas that no longer exists
    ///
    /// Lookups for unknown ids create lock entries; this keeps them from
    /// accumulating.
    pub fn release_lock_if_absent(&self, id: &str) {
        let mut locks = self.locks();
        if !self.canvases.contains_key(id) {
            locks.remove(id);
        }
    }

    /// Append an element to a canvas
    pub fn add_element(&self, id: &str, new: NewElement) -> Result<CanvasElement> {
        let mut canvas = self.get_mut_or_not_found(id)?;
        let element = CanvasElement::from_new(new);
        canvas.elements.push(element.clone());
        canvas.touch();
        Ok(element)
    }

    /// Patch one element in place
    pub fn update_element(
        &self,
        id: &str,
        element_id: &str,
        patch: ElementPatch,
    ) -> Result<CanvasElement> {
        let mut canvas = self.get_mut_or_not_found(id)?;
        let element = canvas
            .elements
            .iter_mut()
            .find(|e| e.id == element_id)
            .ok_or_else(|| AtelierError::NotFound("Element not found".into()))?;
        element.apply(patch);
        let updated = element.clone();
        canvas.touch();
        Ok(updated)
    }

    /// Remove one element, returning it
    pub fn delete_element(&self, id: &str, element_id: &str) -> Result<CanvasElement> {
        let mut canvas = self.get_mut_or_not_found(id)?;
        let index = canvas
            .elements
            .iter()
            .position(|e| e.id == element_id)
            .ok_or_else(|| AtelierError::NotFound("Element not found".into()))?;
        let removed = canvas.elements.remove(index);
        canvas.touch();
        Ok(removed)
    }

    /// Add `identity_id` to the share-set. Sharing with the owner is a no-op.
    pub fn share(&self, id: &str, identity_id: &str) -> Option<Canvas> {
        let mut canvas = self.canvases.get_mut(id)?;
        if canvas.owner_id != identity_id && canvas.shared_with.insert(identity_id.to_string()) {
            canvas.touch();
        }
        Some(canvas.clone())
    }

    /// Remove `identity_id` from the share-set
    pub fn unshare(&self, id: &str, identity_id: &str) -> Option<Canvas> {
        let mut canvas = self.canvases.get_mut(id)?;
        if canvas.shared_with.remove(identity_id) {
            canvas.touch();
        }
        Some(canvas.clone())
    }

    /// Number of stored canvases
    pub fn len(&self) -> usize {
        self.canvases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canvases.is_empty()
    }

    /// Number of live lock entries
    pub fn lock_count(&self) -> usize {
        self.locks().len()
    }

    fn get_mut_or_not_found(
        &self,
        id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Canvas>> {
        self.canvases
            .get_mut(id)
            .ok_or_else(|| AtelierError::NotFound("Canvas not found".into()))
    }
}

impl Default for CanvasStore {
    fn default() -> Self {
        Self::new()
    }
}
