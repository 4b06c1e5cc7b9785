//! Login endpoint
//!
//! `POST /api/canvas/auth/login` with `{"username": "...", "password": "..."}`
//! issues a bearer token for the Change Channel and the canvas routes.

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, json_response, parse_json_body, BoxBody};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: String,
    /// Unix seconds
    pub expires_at: u64,
}

pub async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req, state.args.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.gate.login(&body.username, &body.password) {
        Ok(issued) => json_response(
            StatusCode::OK,
            &LoginResponse {
                access_token: issued.token,
                token_type: "bearer",
                user_id: issued.user_id,
                expires_at: issued.expires_at,
            },
        ),
        Err(e) => error_response(e),
    }
}
