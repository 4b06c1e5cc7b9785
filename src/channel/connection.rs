//! WebSocket upgrade and per-connection loop
//!
//! Authentication flow:
//! 1. JWT from the query string (`?token=...`), else the `Authorization` header
//! 2. Read access to the canvas, checked before the upgrade
//!
//! A rejected request gets a plain HTTP error (401, 403 or 404) instead of a
//! WebSocket. Once upgraded, the connection is registered on its canvas until
//! the client goes away or the canvas is deleted.

use futures_util::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::dispatch::ChannelSession;
use crate::auth::{bearer_token, query_param, Identity};
use crate::hub::{Listener, ListenerQueue};
use crate::routes::{error_response, get_auth_header, to_boxed, BoxBody};
use crate::server::AppState;
use crate::types::{AtelierError, Result};

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Handle `GET /api/canvas/ws/{canvas_id}`
pub async fn handle_canvas_ws(
    state: Arc<AppState>,
    req: Request<Incoming>,
    canvas_id: &str,
) -> Response<BoxBody> {
    let identity = match authenticate(&state, &req) {
        Ok(identity) => identity,
        Err(e) => {
            info!(canvas = %canvas_id, "WebSocket rejected: {}", e);
            return error_response(e);
        }
    };

    // Registered before the 101 goes out so no change made after the client
    // sees the handshake can be missed.
    let (listener, queue) = Listener::new(state.hub.next_connection_id(), identity.clone());
    let session = ChannelSession::new(
        canvas_id.to_string(),
        listener.id,
        identity,
        Arc::clone(&state.store),
        Arc::clone(&state.hub),
    );
    if let Err(e) = state.canvases.attach(canvas_id, listener).await {
        info!(canvas = %canvas_id, user = %session.identity, "WebSocket rejected: {}", e);
        return error_response(e);
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            state.hub.leave(session.connection, canvas_id);
            return error_response(AtelierError::BadRequest(format!(
                "WebSocket upgrade failed: {}",
                e
            )));
        }
    };

    info!(
        canvas = %session.canvas_id,
        user = %session.identity,
        connection = %session.connection,
        listeners = state.hub.listener_count(canvas_id),
        "Listener connected"
    );

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = pump(ws, &session, queue).await {
                    warn!(connection = %session.connection, "WebSocket error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
        session.close();
        info!(
            canvas = %session.canvas_id,
            connection = %session.connection,
            "Listener disconnected"
        );
    });

    to_boxed(response)
}

fn authenticate(state: &AppState, req: &Request<Incoming>) -> Result<Identity> {
    let token = query_param(req.uri().query(), "token")
        .or_else(|| bearer_token(get_auth_header(req)))
        .ok_or_else(|| AtelierError::Unauthorized("Missing token".into()))?;

    state
        .gate
        .authenticate(token)
        .ok_or_else(|| AtelierError::Unauthorized("Invalid token".into()))
}

/// Move frames between the socket and the listener queue until either side ends
async fn pump(ws: HyperWebSocket, session: &ChannelSession, mut queue: ListenerQueue) -> Result<()> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = queue.recv() => {
                match outbound {
                    Some(message) => {
                        let json = message.to_json()?;
                        if sink.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    // Room closed: the canvas was deleted
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(reply) = session.handle_text(&text) {
                            if sink.send(WsMessage::Text(reply.to_json()?)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sink.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(connection = %session.connection, "Client closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.connection, "WebSocket read error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    Ok(())
}
