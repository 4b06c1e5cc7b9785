//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling, with upgrades enabled
//! for the Change Channel.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::SessionGate;
use crate::canvas::{CanvasService, CanvasStore};
use crate::channel;
use crate::config::Args;
use crate::hub::SubscriptionRegistry;
use crate::routes::{self, canvases::CANVASES_PREFIX, BoxBody};
use crate::types::{AtelierError, Result};

const WS_PREFIX: &str = "/api/canvas/ws/";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<CanvasStore>,
    pub hub: Arc<SubscriptionRegistry>,
    pub gate: Arc<SessionGate>,
    pub canvases: CanvasService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args) -> Result<Self> {
        let store = Arc::new(CanvasStore::new());
        let hub = Arc::new(SubscriptionRegistry::new());
        let gate = Arc::new(SessionGate::from_args(&args, Arc::clone(&store))?);
        let canvases = CanvasService::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::clone(&gate),
            args.lock_timeout(),
        );

        Ok(Self {
            args,
            store,
            hub,
            gate,
            canvases,
            started_at: Instant::now(),
        })
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Atelier listening on {}", listener.local_addr()?);

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }
    match state.args.lock_timeout() {
        Some(limit) => info!("Canvas lock timeout: {} ms", limit.as_millis()),
        None => debug!("Canvas lock waits are unbounded"),
    }

    serve(listener, state).await
}

/// Accept connections on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => routes::cors_preflight(),

        (&Method::GET, "/api/canvas/health") | (&Method::GET, "/health") => {
            routes::health_check(&state)
        }
        (&Method::GET, "/version") => routes::version_info(),

        (&Method::POST, "/api/canvas/auth/login") => routes::handle_login(req, state).await,
        (_, "/api/canvas/auth/login") => routes::method_not_allowed(),

        (_, p) if p.starts_with(WS_PREFIX) => {
            let canvas_id = p.trim_start_matches(WS_PREFIX).trim_end_matches('/');
            if canvas_id.is_empty() || canvas_id.contains('/') {
                routes::not_found_response(p)
            } else if method == Method::GET && hyper_tungstenite::is_upgrade_request(&req) {
                channel::handle_canvas_ws(state, req, canvas_id).await
            } else {
                routes::error_response(AtelierError::BadRequest(
                    "WebSocket upgrade required".into(),
                ))
            }
        }

        (_, p) if p.starts_with(CANVASES_PREFIX) => {
            routes::handle_canvas_request(req, state, p).await
        }

        (_, p) => routes::not_found_response(p),
    };

    Ok(response)
}
