//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] amts_core::EmailError),

    /// Input failed validation (e.g. password too short).
    #[error("{0}")]
    Validation(String),

    /// An account with this email already exists.
    #[error("email already registered")]
    DuplicateEmail,

    /// Wrong email, wrong password, or inactive account. Deliberately vague.
    #[error("incorrect email or password")]
    InvalidCredentials,

    /// Missing, malformed, expired, revoked or wrong-type token.
    #[error("could not validate credentials")]
    TokenInvalid,

    /// The caller's role is insufficient.
    #[error("not enough permissions")]
    Forbidden,

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// Token signing failed.
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
