//! Session gate
//!
//! Turns a bearer credential into an [`Identity`] and decides whether that
//! identity may read or write a given canvas. Stateless per call: decisions
//! depend only on the token and the store's current snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::access::{granted_access, AccessLevel};
use super::jwt::{bearer_token, Claims, IssuedToken, TokenSigner};
use crate::canvas::{Canvas, CanvasStore};
use crate::config::Args;
use crate::types::{AtelierError, Result};

/// The principal behind a validated credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
}

impl Identity {
    /// Identity for a login name (`alice` -> `user_alice`)
    pub fn new(username: &str) -> Self {
        Self {
            id: format!("user_{}", username),
            username: username.to_string(),
        }
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

pub struct SessionGate {
    signer: TokenSigner,
    store: Arc<CanvasStore>,
}

impl SessionGate {
    pub fn new(signer: TokenSigner, store: Arc<CanvasStore>) -> Self {
        Self { signer, store }
    }

    /// Build the gate from configuration (dev mode uses the built-in secret)
    pub fn from_args(args: &Args, store: Arc<CanvasStore>) -> Result<Self> {
        let signer = match (&args.jwt_secret, args.dev_mode) {
            (Some(secret), _) => TokenSigner::new(secret, args.jwt_expiry_seconds)?,
            (None, true) => TokenSigner::new_dev(args.jwt_expiry_seconds),
            (None, false) => {
                return Err(AtelierError::Config(
                    "JWT_SECRET is required in production mode".into(),
                ))
            }
        };
        Ok(Self::new(signer, store))
    }

    /// Exchange a username/password pair for a bearer token
    ///
    /// Development-grade: any non-empty pair is accepted.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken> {
        if username.is_empty() || password.is_empty() {
            return Err(AtelierError::Unauthorized("Invalid credentials".into()));
        }

        let identity = Identity::new(username);
        let issued = self.signer.issue(&identity.id, &identity.username)?;

        info!(user = %issued.user_id, "Login successful");
        Ok(issued)
    }

    /// Resolve a token to an identity; `None` for invalid or expired tokens
    pub fn authenticate(&self, token: &str) -> Option<Identity> {
        match self.signer.verify(token) {
            Ok(claims) => Some(Identity::from(claims)),
            Err(err) => {
                debug!(reason = %err, "Token rejected");
                None
            }
        }
    }

    /// Resolve an `Authorization` header value
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<Identity> {
        let token = bearer_token(header)
            .ok_or_else(|| AtelierError::Unauthorized("Missing bearer token".into()))?;
        self.authenticate(token).ok_or_else(|| {
            AtelierError::Unauthorized("Invalid authentication credentials".into())
        })
    }

    /// Fetch `canvas_id` if `identity` holds at least `required` access
    pub fn authorize(
        &self,
        canvas_id: &str,
        identity: &Identity,
        required: AccessLevel,
    ) -> Result<Canvas> {
        let canvas = self
            .store
            .get(canvas_id)
            .ok_or_else(|| AtelierError::NotFound("Canvas not found".into()))?;

        let denied = match granted_access(&canvas, &identity.id) {
            None => "Permission denied",
            Some(granted) if granted < required => "Only owner can modify canvas",
            Some(_) => return Ok(canvas),
        };
        debug!(canvas = %canvas_id, user = %identity, %required, "Access denied");
        Err(AtelierError::Forbidden(denied.into()))
    }
}
