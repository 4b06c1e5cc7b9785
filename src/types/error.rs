//! Error types for Atelier

use hyper::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AtelierError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Only produced when LOCK_TIMEOUT_MS is configured
    #[error("Canvas busy: {0}")]
    LockTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl AtelierError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::Http(_) => "BAD_REQUEST",
            Self::Unauthorized(_) | Self::Auth(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Internal(_) | Self::Config(_) => "INTERNAL",
        }
    }

    /// The message without the kind prefix
    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::LockTimeout(m)
            | Self::Internal(m)
            | Self::Http(m)
            | Self::Config(m)
            | Self::Auth(m) => m,
        }
    }

    /// `{"error": <detail>, "code": <code>}`
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.detail(),
            "code": self.code(),
        })
    }
}

impl From<std::io::Error> for AtelierError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AtelierError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

/// Result type alias for Atelier operations
pub type Result<T> = std::result::Result<T, AtelierError>;
