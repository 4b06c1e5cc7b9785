//! Authentication and authorization for Atelier
//!
//! Provides:
//! - JWT token generation and validation
//! - Access tiers for canvas operations
//! - The session gate tying tokens and canvas ownership together

pub mod access;
pub mod gate;
pub mod jwt;

pub use access::{granted_access, AccessLevel};
pub use gate::{Identity, SessionGate};
pub use jwt::{bearer_token, query_param, Claims, IssuedToken, TokenSigner};
