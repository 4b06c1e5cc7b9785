//! Canvas operations as seen by callers
//!
//! Each mutation runs as: authorize, take the canvas lock, mutate, broadcast,
//! release. Holding the lock across the broadcast keeps every listener's
//! view of a canvas in mutation order.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use super::{Canvas, CanvasElement, CanvasPatch, CanvasStore, ElementPatch, NewElement};
use crate::auth::{AccessLevel, Identity, SessionGate};
use crate::channel::ServerMessage;
use crate::hub::{Listener, SubscriptionRegistry};
use crate::types::{AtelierError, Payload, Result};

/// Request to create a canvas
#[derive(Debug, Clone, Deserialize)]
pub struct NewCanvas {
    pub name: String,
    #[serde(default)]
    pub metadata: Payload,
}

pub struct CanvasService {
    store: Arc<CanvasStore>,
    hub: Arc<SubscriptionRegistry>,
    gate: Arc<SessionGate>,
    lock_timeout: Option<Duration>,
}

impl CanvasService {
    pub fn new(
        store: Arc<CanvasStore>,
        hub: Arc<SubscriptionRegistry>,
        gate: Arc<SessionGate>,
        lock_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            hub,
            gate,
            lock_timeout,
        }
    }

    pub fn create_canvas(&self, identity: &Identity, new: NewCanvas) -> Canvas {
        let canvas = self
            .store
            .create(new.name, identity.id.clone(), new.metadata);
        info!(canvas = %canvas.id, owner = %identity, "Canvas created");
        canvas
    }

    /// Canvases the caller owns or has been shared, oldest first
    pub fn list_canvases(&self, identity: &Identity) -> Vec<Canvas> {
        let mut canvases = self.store.list_for(&identity.id);
        canvases.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        canvases
    }

    pub fn get_canvas(&self, canvas_id: &str, identity: &Identity) -> Result<Canvas> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Read)
    }

    /// Register `listener` on `canvas_id` if its identity may read it
    ///
    /// Runs under the canvas lock, so a listener either joins before a
    /// concurrent delete (and sees `canvas_deleted`) or is refused with
    /// `NotFound`.
    pub async fn attach(&self, canvas_id: &str, listener: Listener) -> Result<()> {
        self.gate
            .authorize(canvas_id, &listener.identity, AccessLevel::Read)?;
        let _guard = self.acquire(canvas_id).await?;

        self.settle(
            canvas_id,
            self.gate
                .authorize(canvas_id, &listener.identity, AccessLevel::Read),
        )?;
        self.hub.join(listener, canvas_id);
        Ok(())
    }

    pub async fn update_canvas(
        &self,
        canvas_id: &str,
        identity: &Identity,
        patch: CanvasPatch,
    ) -> Result<Canvas> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Write)?;
        let _guard = self.acquire(canvas_id).await?;

        let canvas = self.settle(canvas_id, self.store.update(canvas_id, patch))?;
        self.announce_canvas(&canvas);
        Ok(canvas)
    }

    pub async fn delete_canvas(&self, canvas_id: &str, identity: &Identity) -> Result<()> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Write)?;
        let _guard = self.acquire(canvas_id).await?;

        if !self.store.delete(canvas_id) {
            return Err(self.vanished(canvas_id));
        }

        self.hub.broadcast(
            canvas_id,
            ServerMessage::CanvasDeleted {
                canvas_id: canvas_id.to_string(),
            },
            None,
        );
        let closed = self.hub.close_room(canvas_id);
        info!(canvas = %canvas_id, listeners = closed, "Canvas deleted");
        Ok(())
    }

    /// Grant read access to `user_id`
    pub async fn share_canvas(
        &self,
        canvas_id: &str,
        identity: &Identity,
        user_id: &str,
    ) -> Result<Canvas> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Write)?;
        let _guard = self.acquire(canvas_id).await?;

        let canvas = self
            .store
            .share(canvas_id, user_id)
            .ok_or_else(|| self.vanished(canvas_id))?;
        self.announce_canvas(&canvas);
        Ok(canvas)
    }

    /// Revoke read access from `user_id`
    ///
    /// Listeners already attached stay attached until they disconnect.
    pub async fn unshare_canvas(
        &self,
        canvas_id: &str,
        identity: &Identity,
        user_id: &str,
    ) -> Result<Canvas> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Write)?;
        let _guard = self.acquire(canvas_id).await?;

        let canvas = self
            .store
            .unshare(canvas_id, user_id)
            .ok_or_else(|| self.vanished(canvas_id))?;
        self.announce_canvas(&canvas);
        Ok(canvas)
    }

    pub async fn add_element(
        &self,
        canvas_id: &str,
        identity: &Identity,
        new: NewElement,
    ) -> Result<CanvasElement> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Read)?;
        let _guard = self.acquire(canvas_id).await?;

        let element = self.settle(canvas_id, self.store.add_element(canvas_id, new))?;
        self.hub.broadcast(
            canvas_id,
            ServerMessage::ElementAdded {
                canvas_id: canvas_id.to_string(),
                element: element.clone(),
            },
            None,
        );
        Ok(element)
    }

    pub async fn update_element(
        &self,
        canvas_id: &str,
        element_id: &str,
        identity: &Identity,
        patch: ElementPatch,
    ) -> Result<CanvasElement> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Read)?;
        let _guard = self.acquire(canvas_id).await?;

        let element = self.settle(
            canvas_id,
            self.store.update_element(canvas_id, element_id, patch),
        )?;
        self.hub.broadcast(
            canvas_id,
            ServerMessage::ElementUpdated {
                canvas_id: canvas_id.to_string(),
                element: element.clone(),
            },
            None,
        );
        Ok(element)
    }

    pub async fn delete_element(
        &self,
        canvas_id: &str,
        element_id: &str,
        identity: &Identity,
    ) -> Result<CanvasElement> {
        self.gate.authorize(canvas_id, identity, AccessLevel::Read)?;
        let _guard = self.acquire(canvas_id).await?;

        let element = self.settle(canvas_id, self.store.delete_element(canvas_id, element_id))?;
        self.hub.broadcast(
            canvas_id,
            ServerMessage::ElementDeleted {
                canvas_id: canvas_id.to_string(),
                element_id: element.id.clone(),
                element: element.clone(),
            },
            None,
        );
        Ok(element)
    }

    /// Wait for the canvas lock, bounded by the configured timeout
    async fn acquire(&self, canvas_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self.store.lock_for(canvas_id);
        match self.lock_timeout {
            None => Ok(lock.lock_owned().await),
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| {
                    warn!(canvas = %canvas_id, timeout_ms = limit.as_millis() as u64, "Lock wait timed out");
                    AtelierError::LockTimeout(format!(
                        "Canvas {} is busy, try again",
                        canvas_id
                    ))
                }),
        }
    }

    fn announce_canvas(&self, canvas: &Canvas) {
        self.hub.broadcast(
            &canvas.id,
            ServerMessage::CanvasUpdate {
                canvas_id: canvas.id.clone(),
                data: canvas.clone(),
            },
            None,
        );
    }

    /// The canvas was deleted while we waited for its lock
    fn vanished(&self, canvas_id: &str) -> AtelierError {
        self.store.release_lock_if_absent(canvas_id);
        AtelierError::NotFound("Canvas not found".into())
    }

    fn settle<T>(&self, canvas_id: &str, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.store.release_lock_if_absent(canvas_id);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSigner;
    use crate::hub::ListenerQueue;
    use crate::canvas::Position;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    struct Fixture {
        store: Arc<CanvasStore>,
        hub: Arc<SubscriptionRegistry>,
        service: Arc<CanvasService>,
        owner: Identity,
        guest: Identity,
    }

    fn fixture(lock_timeout: Option<Duration>) -> Fixture {
        let store = Arc::new(CanvasStore::new());
        let hub = Arc::new(SubscriptionRegistry::new());
        let gate = Arc::new(SessionGate::new(
            TokenSigner::new_dev(1800),
            Arc::clone(&store),
        ));
        let service = Arc::new(CanvasService::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            gate,
            lock_timeout,
        ));
        Fixture {
            store,
            hub,
            service,
            owner: Identity::new("owner"),
            guest: Identity::new("guest"),
        }
    }

    impl Fixture {
        fn canvas(&self) -> Canvas {
            self.service.create_canvas(
                &self.owner,
                NewCanvas {
                    name: "Roadmap".into(),
                    metadata: Payload::new(),
                },
            )
        }

        fn listen(&self, canvas_id: &str, identity: &Identity) -> ListenerQueue {
            let (listener, queue) = Listener::new(self.hub.next_connection_id(), identity.clone());
            self.hub.join(listener, canvas_id);
            queue
        }
    }

    fn sticky() -> NewElement {
        serde_json::from_value(json!({
            "type": "sticky",
            "position": {"x": 1.0, "y": 1.0},
            "size": {"width": 10.0, "height": 10.0},
            "content": {"text": "hi"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_your_write() {
        let fx = fixture(None);
        let canvas = fx.canvas();

        let updated = fx
            .service
            .update_canvas(
                &canvas.id,
                &fx.owner,
                CanvasPatch {
                    name: Some("Roadmap v2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = fx.service.get_canvas(&canvas.id, &fx.owner).unwrap();
        assert_eq!(fetched.name, "Roadmap v2");
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn test_mutation_broadcasts_to_listeners() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        let mut queue = fx.listen(&canvas.id, &fx.owner);

        let element = fx
            .service
            .add_element(&canvas.id, &fx.owner, sticky())
            .await
            .unwrap();

        assert_eq!(
            *queue.try_recv().unwrap(),
            ServerMessage::ElementAdded {
                canvas_id: canvas.id.clone(),
                element: element.clone(),
            }
        );

        let patch = ElementPatch {
            position: Some(Position { x: 50.0, y: 60.0 }),
            ..Default::default()
        };
        let moved = fx
            .service
            .update_element(&canvas.id, &element.id, &fx.owner, patch)
            .await
            .unwrap();
        assert_eq!(moved.content["text"], "hi");

        match &*queue.try_recv().unwrap() {
            ServerMessage::ElementUpdated { element, .. } => {
                assert_eq!(element.position, Position { x: 50.0, y: 60.0 })
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_element_ops_allowed_for_shared_reader() {
        let fx = fixture(None);
        let canvas = fx.canvas();

        let denied = fx.service.add_element(&canvas.id, &fx.guest, sticky()).await;
        assert!(matches!(denied, Err(AtelierError::Forbidden(_))));

        fx.service
            .share_canvas(&canvas.id, &fx.owner, &fx.guest.id)
            .await
            .unwrap();

        let element = fx
            .service
            .add_element(&canvas.id, &fx.guest, sticky())
            .await
            .unwrap();
        let removed = fx
            .service
            .delete_element(&canvas.id, &element.id, &fx.guest)
            .await
            .unwrap();
        assert_eq!(removed.id, element.id);

        let rename = fx
            .service
            .update_canvas(&canvas.id, &fx.guest, CanvasPatch::default())
            .await;
        assert!(matches!(rename, Err(AtelierError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_unshare_revokes_access() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        fx.service
            .share_canvas(&canvas.id, &fx.owner, &fx.guest.id)
            .await
            .unwrap();
        assert!(fx.service.get_canvas(&canvas.id, &fx.guest).is_ok());

        let canvas = fx
            .service
            .unshare_canvas(&canvas.id, &fx.owner, &fx.guest.id)
            .await
            .unwrap();
        assert!(canvas.shared_with.is_empty());
        assert!(matches!(
            fx.service.get_canvas(&canvas.id, &fx.guest),
            Err(AtelierError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_closes_room_and_lock() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        let mut queue = fx.listen(&canvas.id, &fx.owner);
        fx.service
            .add_element(&canvas.id, &fx.owner, sticky())
            .await
            .unwrap();
        let _ = queue.recv().await;

        fx.service.delete_canvas(&canvas.id, &fx.owner).await.unwrap();

        assert_eq!(
            *queue.recv().await.unwrap(),
            ServerMessage::CanvasDeleted {
                canvas_id: canvas.id.clone()
            }
        );
        assert!(queue.recv().await.is_none());
        assert!(!fx.hub.is_tracked(&canvas.id));
        assert_eq!(fx.store.lock_count(), 0);
        assert!(matches!(
            fx.service.get_canvas(&canvas.id, &fx.owner),
            Err(AtelierError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_canvas_and_element() {
        let fx = fixture(None);
        let err = fx
            .service
            .add_element("nonexistent-id", &fx.owner, sticky())
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::NotFound(_)));
        assert_eq!(fx.store.lock_count(), 0);

        let canvas = fx.canvas();
        let err = fx
            .service
            .delete_element(&canvas.id, "no-such-element", &fx.owner)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Element not found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        let mut queue = fx.listen(&canvas.id, &fx.owner);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let service = Arc::clone(&fx.service);
            let owner = fx.owner.clone();
            let canvas_id = canvas.id.clone();
            handles.push(tokio::spawn(async move {
                service.add_element(&canvas_id, &owner, sticky()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = fx.store.get(&canvas.id).unwrap();
        assert_eq!(stored.elements.len(), 32);

        let mut announced = 0;
        while queue.try_recv().is_ok() {
            announced += 1;
        }
        assert_eq!(announced, 32);
    }

    #[test]
    fn test_writer_waits_for_lock_holder() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        let lock = fx.store.lock_for(&canvas.id);
        let held = lock.try_lock_owned().unwrap();

        let service = Arc::clone(&fx.service);
        let owner = fx.owner.clone();
        let canvas_id = canvas.id.clone();
        let mut update = task::spawn(async move {
            service
                .update_canvas(
                    &canvas_id,
                    &owner,
                    CanvasPatch {
                        name: Some("later".into()),
                        ..Default::default()
                    },
                )
                .await
        });

        assert_pending!(update.poll());
        assert_eq!(fx.store.get(&canvas.id).unwrap().name, "Roadmap");

        drop(held);
        assert!(update.is_woken());
        let updated = assert_ready!(update.poll()).unwrap();
        assert_eq!(updated.name, "later");
    }

    #[tokio::test]
    async fn test_lock_timeout_reports_busy() {
        let fx = fixture(Some(Duration::from_millis(20)));
        let canvas = fx.canvas();
        let _held = fx.store.lock_for(&canvas.id).lock_owned().await;

        let err = fx
            .service
            .delete_canvas(&canvas.id, &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::LockTimeout(_)));
        assert!(fx.store.get(&canvas.id).is_some());
    }

    #[test]
    fn test_attach_refused_when_delete_lands_first() {
        let fx = fixture(None);
        let canvas = fx.canvas();
        let held = fx.store.lock_for(&canvas.id).try_lock_owned().unwrap();

        let (listener, mut queue) = Listener::new(fx.hub.next_connection_id(), fx.guest.clone());
        fx.store.share(&canvas.id, &fx.guest.id).unwrap();
        let service = Arc::clone(&fx.service);
        let canvas_id = canvas.id.clone();
        let mut attach = task::spawn(async move { service.attach(&canvas_id, listener).await });

        // Read access checks out, then the join waits behind the lock holder
        assert_pending!(attach.poll());

        assert!(fx.store.delete(&canvas.id));
        drop(held);

        let err = assert_ready!(attach.poll()).unwrap_err();
        assert!(matches!(err, AtelierError::NotFound(_)));
        assert!(!fx.hub.is_tracked(&canvas.id));
        assert!(matches!(
            queue.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(fx.store.lock_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_attach_racing_delete_never_leaks_a_room() {
        for _ in 0..50 {
            let fx = fixture(None);
            let canvas = fx.canvas();
            let (listener, mut queue) =
                Listener::new(fx.hub.next_connection_id(), fx.owner.clone());

            let attach = {
                let service = Arc::clone(&fx.service);
                let canvas_id = canvas.id.clone();
                tokio::spawn(async move { service.attach(&canvas_id, listener).await })
            };
            let delete = {
                let service = Arc::clone(&fx.service);
                let canvas_id = canvas.id.clone();
                let owner = fx.owner.clone();
                tokio::spawn(async move { service.delete_canvas(&canvas_id, &owner).await })
            };

            let attached = attach.await.unwrap();
            delete.await.unwrap().unwrap();

            assert!(fx.store.get(&canvas.id).is_none());
            assert!(!fx.hub.is_tracked(&canvas.id));

            // Either the listener joined in time to hear the deletion, or it
            // was refused; in both cases its queue ends.
            let first = tokio::time::timeout(Duration::from_secs(1), queue.recv())
                .await
                .unwrap();
            match attached {
                Ok(()) => {
                    assert_eq!(
                        first.as_deref(),
                        Some(&ServerMessage::CanvasDeleted {
                            canvas_id: canvas.id.clone()
                        })
                    );
                    assert!(queue.recv().await.is_none());
                }
                Err(err) => {
                    assert!(matches!(err, AtelierError::NotFound(_)));
                    assert!(first.is_none());
                }
            }
        }
    }

    #[test]
    fn test_list_is_scoped_to_caller() {
        let fx = fixture(None);
        let first = fx.canvas();
        let second = fx.canvas();
        fx.service.create_canvas(
            &fx.guest,
            NewCanvas {
                name: "private".into(),
                metadata: Payload::new(),
            },
        );

        let ids: Vec<String> = fx
            .service
            .list_canvases(&fx.owner)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
    }
}
