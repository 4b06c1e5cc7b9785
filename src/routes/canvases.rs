//! Canvas REST routes
//!
//! Everything under `/api/canvas/canvases`. Every route needs a bearer token;
//! per-canvas access is decided by the session gate inside the service.

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    error_response, get_auth_header, json_response, method_not_allowed, not_found_response,
    parse_json_body, BoxBody,
};
use crate::auth::Identity;
use crate::canvas::service::NewCanvas;
use crate::canvas::{CanvasPatch, ElementPatch, NewElement};
use crate::server::AppState;
use crate::types::Result;

pub const CANVASES_PREFIX: &str = "/api/canvas/canvases";

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CanvasDeleted<'a> {
    pub status: &'static str,
    pub canvas_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ElementDeleted<'a> {
    pub status: &'static str,
    pub element_id: &'a str,
}

/// Route a request whose path starts with [`CANVASES_PREFIX`]
pub async fn handle_canvas_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    path: &str,
) -> Response<BoxBody> {
    let Some(rest) = path.strip_prefix(CANVASES_PREFIX) else {
        return not_found_response(path);
    };
    if !rest.is_empty() && !rest.starts_with('/') {
        return not_found_response(path);
    }
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    let identity = match state.gate.authenticate_header(get_auth_header(&req)) {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    let method = req.method().clone();
    let result = match (&method, segments.as_slice()) {
        (&Method::POST, []) => create_canvas(req, &state, &identity).await,
        (&Method::GET, []) => Ok(json_response(
            StatusCode::OK,
            &state.canvases.list_canvases(&identity),
        )),
        (_, []) => Ok(method_not_allowed()),

        (&Method::GET, [canvas_id]) => state
            .canvases
            .get_canvas(canvas_id, &identity)
            .map(|canvas| json_response(StatusCode::OK, &canvas)),
        (&Method::PUT, [canvas_id]) => update_canvas(req, &state, &identity, canvas_id).await,
        (&Method::DELETE, [canvas_id]) => state
            .canvases
            .delete_canvas(canvas_id, &identity)
            .await
            .map(|()| {
                json_response(
                    StatusCode::OK,
                    &CanvasDeleted {
                        status: "deleted",
                        canvas_id,
                    },
                )
            }),
        (_, [_]) => Ok(method_not_allowed()),

        (&Method::POST, [canvas_id, "share"]) => {
            share_canvas(req, &state, &identity, canvas_id).await
        }
        (&Method::DELETE, [canvas_id, "share", user_id]) => state
            .canvases
            .unshare_canvas(canvas_id, &identity, user_id)
            .await
            .map(|canvas| json_response(StatusCode::OK, &canvas)),

        (&Method::POST, [canvas_id, "elements"]) => {
            add_element(req, &state, &identity, canvas_id).await
        }
        (&Method::PUT, [canvas_id, "elements", element_id]) => {
            update_element(req, &state, &identity, canvas_id, element_id).await
        }
        (&Method::DELETE, [canvas_id, "elements", element_id]) => state
            .canvases
            .delete_element(canvas_id, element_id, &identity)
            .await
            .map(|element| {
                json_response(
                    StatusCode::OK,
                    &ElementDeleted {
                        status: "deleted",
                        element_id: &element.id,
                    },
                )
            }),
        (_, [_, "share"]) | (_, [_, "share", _]) | (_, [_, "elements"]) | (_, [_, "elements", _]) => {
            Ok(method_not_allowed())
        }

        _ => Ok(not_found_response(path)),
    };

    result.unwrap_or_else(error_response)
}

async fn create_canvas(
    req: Request<Incoming>,
    state: &AppState,
    identity: &Identity,
) -> Result<Response<BoxBody>> {
    let body: NewCanvas = parse_json_body(req, state.args.max_body_bytes).await?;
    let canvas = state.canvases.create_canvas(identity, body);
    Ok(json_response(StatusCode::CREATED, &canvas))
}

async fn update_canvas(
    req: Request<Incoming>,
    state: &AppState,
    identity: &Identity,
    canvas_id: &str,
) -> Result<Response<BoxBody>> {
    let patch: CanvasPatch = parse_json_body(req, state.args.max_body_bytes).await?;
    let canvas = state
        .canvases
        .update_canvas(canvas_id, identity, patch)
        .await?;
    Ok(json_response(StatusCode::OK, &canvas))
}

async fn share_canvas(
    req: Request<Incoming>,
    state: &AppState,
    identity: &Identity,
    canvas_id: &str,
) -> Result<Response<BoxBody>> {
    let body: ShareRequest = parse_json_body(req, state.args.max_body_bytes).await?;
    let canvas = state
        .canvases
        .share_canvas(canvas_id, identity, &body.user_id)
        .await?;
    Ok(json_response(StatusCode::OK, &canvas))
}

async fn add_element(
    req: Request<Incoming>,
    state: &AppState,
    identity: &Identity,
    canvas_id: &str,
) -> Result<Response<BoxBody>> {
    let new: NewElement = parse_json_body(req, state.args.max_body_bytes).await?;
    let element = state.canvases.add_element(canvas_id, identity, new).await?;
    Ok(json_response(StatusCode::CREATED, &element))
}

async fn update_element(
    req: Request<Incoming>,
    state: &AppState,
    identity: &Identity,
    canvas_id: &str,
    element_id: &str,
) -> Result<Response<BoxBody>> {
    let patch: ElementPatch = parse_json_body(req, state.args.max_body_bytes).await?;
    let element = state
        .canvases
        .update_element(canvas_id, element_id, identity, patch)
        .await?;
    Ok(json_response(StatusCode::OK, &element))
}
