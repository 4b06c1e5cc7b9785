//! Inbound message dispatch for one attached connection

use std::sync::Arc;
use tracing::debug;

use super::messages::{ClientMessage, ServerMessage};
use crate::auth::Identity;
use crate::canvas::CanvasStore;
use crate::hub::{ConnectionId, SubscriptionRegistry};

/// A connection attached to one canvas
pub struct ChannelSession {
    pub canvas_id: String,
    pub connection: ConnectionId,
    pub identity: Identity,
    store: Arc<CanvasStore>,
    hub: Arc<SubscriptionRegistry>,
}

impl ChannelSession {
    pub fn new(
        canvas_id: String,
        connection: ConnectionId,
        identity: Identity,
        store: Arc<CanvasStore>,
        hub: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            canvas_id,
            connection,
            identity,
            store,
            hub,
        }
    }

    /// Handle one text frame, returning a reply for the sender only
    pub fn handle_text(&self, text: &str) -> Option<ServerMessage> {
        match ClientMessage::parse(text) {
            Some(message) => self.dispatch(message),
            None => {
                debug!(connection = %self.connection, "Ignoring malformed frame");
                None
            }
        }
    }

    pub fn dispatch(&self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::ElementUpdate { data } => {
                if self.is_owner() {
                    self.relay(ServerMessage::ElementUpdate {
                        user_id: self.identity.id.clone(),
                        data,
                    });
                } else {
                    debug!(
                        connection = %self.connection,
                        user = %self.identity,
                        "Dropping element_update from non-owner"
                    );
                }
                None
            }
            ClientMessage::CursorPosition { position } => {
                self.relay(ServerMessage::CursorPosition {
                    user_id: self.identity.id.clone(),
                    position,
                });
                None
            }
            ClientMessage::Ping => Some(ServerMessage::Pong),
            ClientMessage::Unknown => {
                debug!(connection = %self.connection, "Ignoring unknown message type");
                None
            }
        }
    }

    /// Detach from the canvas and tell the remaining listeners
    pub fn close(&self) {
        self.hub.leave(self.connection, &self.canvas_id);
        self.hub.broadcast(
            &self.canvas_id,
            ServerMessage::UserDisconnected {
                user_id: self.identity.id.clone(),
            },
            None,
        );
    }

    fn is_owner(&self) -> bool {
        self.store
            .get(&self.canvas_id)
            .is_some_and(|canvas| canvas.owner_id == self.identity.id)
    }

    fn relay(&self, message: ServerMessage) {
        self.hub
            .broadcast(&self.canvas_id, message, Some(self.connection));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Listener, ListenerQueue};
    use crate::types::Payload;
    use serde_json::json;

    struct Fixture {
        store: Arc<CanvasStore>,
        hub: Arc<SubscriptionRegistry>,
        canvas_id: String,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(CanvasStore::new());
            let canvas = store.create("board".into(), "user_owner".into(), Payload::new());
            Self {
                store,
                hub: Arc::new(SubscriptionRegistry::new()),
                canvas_id: canvas.id,
            }
        }

        fn attach(&self, name: &str) -> (ChannelSession, ListenerQueue) {
            let identity = Identity::new(name);
            let (listener, queue) = Listener::new(self.hub.next_connection_id(), identity.clone());
            let connection = listener.id;
            self.hub.join(listener, &self.canvas_id);
            let session = ChannelSession::new(
                self.canvas_id.clone(),
                connection,
                identity,
                Arc::clone(&self.store),
                Arc::clone(&self.hub),
            );
            (session, queue)
        }
    }

    #[test]
    fn test_ping_replies_directly() {
        let fx = Fixture::new();
        let (owner, mut owner_q) = fx.attach("owner");
        let (_guest, mut guest_q) = fx.attach("guest");

        assert_eq!(owner.handle_text(r#"{"type":"ping"}"#), Some(ServerMessage::Pong));
        assert!(owner_q.try_recv().is_err());
        assert!(guest_q.try_recv().is_err());
    }

    #[test]
    fn test_cursor_relayed_to_others() {
        let fx = Fixture::new();
        let (_owner, mut owner_q) = fx.attach("owner");
        let (guest, mut guest_q) = fx.attach("guest");

        assert!(guest
            .handle_text(r#"{"type":"cursor_position","position":{"x":5,"y":6}}"#)
            .is_none());

        assert!(guest_q.try_recv().is_err());
        assert_eq!(
            *owner_q.try_recv().unwrap(),
            ServerMessage::CursorPosition {
                user_id: "user_guest".into(),
                position: json!({"x": 5, "y": 6}),
            }
        );
    }

    #[test]
    fn test_element_update_owner_only() {
        let fx = Fixture::new();
        let (owner, mut owner_q) = fx.attach("owner");
        let (guest, mut guest_q) = fx.attach("guest");

        guest.handle_text(r#"{"type":"element_update","data":{"id":"e1"}}"#);
        assert!(owner_q.try_recv().is_err());

        owner.handle_text(r#"{"type":"element_update","data":{"id":"e1"}}"#);
        assert_eq!(
            *guest_q.try_recv().unwrap(),
            ServerMessage::ElementUpdate {
                user_id: "user_owner".into(),
                data: json!({"id": "e1"}),
            }
        );
        assert!(owner_q.try_recv().is_err());
    }

    #[test]
    fn test_garbage_is_ignored() {
        let fx = Fixture::new();
        let (owner, _owner_q) = fx.attach("owner");
        let (_guest, mut guest_q) = fx.attach("guest");

        assert!(owner.handle_text("{{{").is_none());
        assert!(owner.handle_text(r#"{"type":"teleport"}"#).is_none());
        assert!(guest_q.try_recv().is_err());
    }

    #[test]
    fn test_close_announces_departure() {
        let fx = Fixture::new();
        let (owner, mut owner_q) = fx.attach("owner");
        let (guest, _guest_q) = fx.attach("guest");

        guest.close();

        assert_eq!(fx.hub.listener_count(&fx.canvas_id), 1);
        assert_eq!(
            *owner_q.try_recv().unwrap(),
            ServerMessage::UserDisconnected {
                user_id: "user_guest".into()
            }
        );

        owner.close();
        assert!(!fx.hub.is_tracked(&fx.canvas_id));
    }
}
