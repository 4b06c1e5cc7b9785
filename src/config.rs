//! Configuration for Atelier
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Minimum accepted length for a production JWT secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Atelier - collaborative canvas gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "atelier")]
#[command(about = "In-memory collaborative canvas store with live WebSocket updates")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (built-in JWT secret, verbose warnings)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "1800")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Give up waiting for a canvas lock after this many milliseconds.
    /// Unset means writers wait indefinitely.
    #[arg(long, env = "LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: Option<u64>,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Configuration suitable for tests and local development
    pub fn dev() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            dev_mode: true,
            jwt_secret: None,
            jwt_expiry_seconds: 1800,
            log_level: "debug".to_string(),
            log_format: "text".to_string(),
            lock_timeout_ms: None,
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Lock acquisition timeout, if configured
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_JWT_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err("LOG_FORMAT must be 'text' or 'json'".to_string());
        }

        if self.lock_timeout_ms == Some(0) {
            return Err("LOCK_TIMEOUT_MS must be greater than zero when set".to_string());
        }

        Ok(())
    }
}
