//! Authentication error types.

use crate::db::StoreError;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential store failure (including unresolved duplicate keys)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Wrong password, or the account has no password set
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account not found
    #[error("Account not found")]
    NotFound,

    /// Provider profile is missing required fields
    #[error("Invalid provider profile: {0}")]
    InvalidProfile(String),

    /// Token signature, algorithm or payload rejected
    #[error("Invalid token")]
    InvalidToken,

    /// Token signing failed
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// Token is past its expiry
    #[error("Token expired")]
    ExpiredToken,

    /// Identity provider could not supply a profile
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Email already belongs to another account
    #[error("Email already exists")]
    EmailTaken,

    /// Email does not look like an address
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Account role does not permit the operation
    #[error("Insufficient role")]
    Forbidden,

    /// Concurrent writers kept winning the unique constraints
    #[error("Account changed concurrently, please retry")]
    Conflict,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage errors are sanitized, and unknown accounts are reported the same
    /// way as wrong passwords so login responses cannot be used to enumerate emails.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Store(_) | AuthError::JwtError(_) => "Internal server error".to_string(),
            AuthError::NotFound | AuthError::InvalidCredentials => {
                "Authentication failed".to_string()
            }
            AuthError::InvalidToken | AuthError::ExpiredToken => {
                "Invalid or expired token".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
