//! Error types for the auth/admission layer.

use thiserror::Error;

/// Errors returned while admitting or authenticating a session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("peer is blocked")]
    Blocked,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("input rejected: {0}")]
    InvalidInput(String),
}
