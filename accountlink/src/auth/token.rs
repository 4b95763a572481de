//! Stateless session tokens (HS256 JWT).

use super::{
    errors::{AuthError, AuthResult},
    models::{AccountId, SessionClaims},
};
use crate::config::TokenConfig;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::sync::Arc;

/// Issues and verifies session tokens.
///
/// The keys are derived once from [`TokenConfig`]; validity depends only on the
/// signature and the `exp` claim, so verification never touches storage.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    ttl: Duration,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            ttl: config.ttl,
        }
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `account_id`, valid from now for the configured TTL.
    pub fn issue(&self, account_id: AccountId) -> AuthResult<String> {
        self.issue_at(account_id, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidToken` - `now + ttl` is past the representable range
    /// * `AuthError::JwtError` - Signing failed
    pub fn issue_at(&self, account_id: AccountId, now: DateTime<Utc>) -> AuthResult<String> {
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or(AuthError::InvalidToken)?;
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys.encoding,
        )?)
    }

    /// Verify a token and return the account it was issued for.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidToken` - Bad signature, foreign algorithm or malformed payload
    /// * `AuthError::ExpiredToken` - Signature fine but past `exp`
    pub fn verify(&self, token: &str) -> AuthResult<AccountId> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<AccountId> {
        let claims = self.decode_claims(token)?;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        claims.sub.parse().map_err(|_| AuthError::InvalidToken)
    }

    fn decode_claims(&self, token: &str) -> AuthResult<SessionClaims> {
        // Expiry is checked against the caller's clock in `verify_at`
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<SessionClaims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                AuthError::InvalidToken
            })
    }
}
