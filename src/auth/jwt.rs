//! Bearer tokens for canvas sessions
//!
//! Tokens are HS256 JWTs carrying the identity id and login name. Keys are
//! derived once from the configured secret and shared by every request.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::MIN_JWT_SECRET_LEN;
use crate::types::{AtelierError, Result};

const DEV_SECRET: &str = "atelier-development-signing-key-do-not-deploy";

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id (`user_<username>`)
    pub sub: String,
    pub username: String,
    pub iat: u64,
    pub exp: u64,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: u64,
}

/// Signs and checks session tokens
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: u64,
}

impl TokenSigner {
    /// Signer for a configured secret; rejects secrets shorter than
    /// [`MIN_JWT_SECRET_LEN`]
    pub fn new(secret: &str, lifetime_secs: u64) -> Result<Self> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AtelierError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        Ok(Self::with_key(secret.as_bytes(), lifetime_secs))
    }

    /// Signer using the built-in development key
    pub fn new_dev(lifetime_secs: u64) -> Self {
        Self::with_key(DEV_SECRET.as_bytes(), lifetime_secs)
    }

    fn with_key(key: &[u8], lifetime_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            lifetime_secs,
        }
    }

    /// Sign a token for `user_id`, valid for the configured lifetime
    pub fn issue(&self, user_id: &str, username: &str) -> Result<IssuedToken> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AtelierError::Auth(format!("clock before epoch: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat,
            exp: iat + self.lifetime_secs,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AtelierError::Auth(format!("signing failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            user_id: claims.sub,
            expires_at: claims.exp,
        })
    }

    /// Decode `token`, checking signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Malformed token",
                };
                AtelierError::Unauthorized(reason.into())
            })
    }
}

/// Token from an `Authorization` value: `Bearer <token>` or a bare token
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?;
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        // A scheme word with no credential
        None if value.eq_ignore_ascii_case("bearer") => return None,
        None => value.trim(),
    };
    (!token.is_empty()).then_some(token)
}

/// Non-empty value of `name` in a raw query string
pub fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}
