//! Subscription registry
//!
//! Tracks which live connections listen on which canvas and fans out
//! notifications to them.
//!
//! Each listener owns an unbounded queue drained by its connection task, so a
//! broadcast never waits on the network and every listener observes messages
//! in the order `broadcast` was called for its canvas.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::Identity;
use crate::channel::ServerMessage;

/// Receiving half of a listener queue
pub type ListenerQueue = mpsc::UnboundedReceiver<Arc<ServerMessage>>;

/// Identifier of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A registered listener: who opened the connection and where to deliver
#[derive(Debug, Clone)]
pub struct Listener {
    pub id: ConnectionId,
    pub identity: Identity,
    sender: mpsc::UnboundedSender<Arc<ServerMessage>>,
}

impl Listener {
    /// Create a listener and the queue its connection task drains
    pub fn new(id: ConnectionId, identity: Identity) -> (Self, ListenerQueue) {
        let (sender, queue) = mpsc::unbounded_channel();
        (
            Self {
                id,
                identity,
                sender,
            },
            queue,
        )
    }

    fn deliver(&self, message: &Arc<ServerMessage>) -> bool {
        self.sender.send(Arc::clone(message)).is_ok()
    }
}

/// Canvas id -> live listeners
pub struct SubscriptionRegistry {
    rooms: DashMap<String, HashMap<ConnectionId, Listener>>,
    /// Connection -> the one canvas it is attached to
    memberships: DashMap<ConnectionId, String>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a new connection
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `listener` on `canvas_id`
    ///
    /// Joining twice keeps a single registration. A connection attached to a
    /// different canvas is moved.
    pub fn join(&self, listener: Listener, canvas_id: &str) {
        let id = listener.id;

        let previous = self.memberships.insert(id, canvas_id.to_string());
        if let Some(previous) = previous.filter(|p| p != canvas_id) {
            self.remove_from_room(id, &previous);
        }

        self.rooms
            .entry(canvas_id.to_string())
            .or_default()
            .insert(id, listener);

        debug!(canvas = %canvas_id, connection = %id, "Listener joined");
    }

    /// Unregister a connection from `canvas_id`
    pub fn leave(&self, id: ConnectionId, canvas_id: &str) {
        self.memberships.remove_if(&id, |_, attached| attached == canvas_id);
        if self.remove_from_room(id, canvas_id) {
            debug!(canvas = %canvas_id, connection = %id, "Listener left");
        }
    }

    /// Deliver `message` to every listener on `canvas_id` except `exclude`
    ///
    /// Listeners whose queue is closed are pruned. Returns the number of
    /// listeners the message was handed to.
    pub fn broadcast(
        &self,
        canvas_id: &str,
        message: ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let message = Arc::new(message);
        let mut failed = Vec::new();
        let mut delivered = 0;

        let now_empty = {
            let Some(mut room) = self.rooms.get_mut(canvas_id) else {
                return 0;
            };

            for (id, listener) in room.iter() {
                if Some(*id) == exclude {
                    continue;
                }
                if listener.deliver(&message) {
                    delivered += 1;
                } else {
                    failed.push(*id);
                }
            }

            for id in &failed {
                room.remove(id);
            }
            room.is_empty()
        };

        for id in failed {
            self.memberships.remove_if(&id, |_, attached| attached == canvas_id);
            debug!(canvas = %canvas_id, connection = %id, "Pruned closed listener");
        }

        if now_empty {
            self.rooms.remove_if(canvas_id, |_, room| room.is_empty());
        }

        delivered
    }

    /// Drop every listener of `canvas_id`
    ///
    /// Their queues close, which ends the owning connection tasks.
    pub fn close_room(&self, canvas_id: &str) -> usize {
        let Some((_, room)) = self.rooms.remove(canvas_id) else {
            return 0;
        };
        for id in room.keys() {
            self.memberships.remove_if(id, |_, attached| attached == canvas_id);
        }
        debug!(canvas = %canvas_id, listeners = room.len(), "Room closed");
        room.len()
    }

    /// Whether any listener is registered for `canvas_id`
    pub fn is_tracked(&self, canvas_id: &str) -> bool {
        self.rooms.contains_key(canvas_id)
    }

    /// Number of canvases with at least one listener
    pub fn tracked_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn listener_count(&self, canvas_id: &str) -> usize {
        self.rooms.get(canvas_id).map(|room| room.len()).unwrap_or(0)
    }

    /// Total live connections across all canvases
    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    /// Remove `id` from one room, dropping the room if it empties
    fn remove_from_room(&self, id: ConnectionId, canvas_id: &str) -> bool {
        let (removed, now_empty) = match self.rooms.get_mut(canvas_id) {
            Some(mut room) => {
                let removed = room.remove(&id).is_some();
                (removed, room.is_empty())
            }
            None => return false,
        };
        if now_empty {
            self.rooms.remove_if(canvas_id, |_, room| room.is_empty());
        }
        removed
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
