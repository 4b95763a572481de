//! Authentication module: password and provider login, session tokens and account linking.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - HS256 session tokens (7-day expiry by default)
//! - Reconciliation of identity-provider profiles onto accounts
//! - An [`Authenticator`] tying the pieces to an [`AccountRepository`](crate::db::AccountRepository)
//!
//! ## Example
//!
//! ```no_run
//! use accountlink::auth::{Authenticator, RegisterRequest};
//! use accountlink::config::AuthConfig;
//! use accountlink::db::MemoryAccountRepository;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::load()?;
//!     let auth = Authenticator::new(Arc::new(MemoryAccountRepository::new()), &config)?;
//!
//!     let request = RegisterRequest {
//!         email: "a@a.com".to_string(),
//!         password: "123456".to_string(),
//!         name: None,
//!         avatar: None,
//!     };
//!     auth.register(request).await?;
//!
//!     let (account, token) = auth.authenticate_with_password("a@a.com", "123456").await?;
//!     println!("{} logged in, token {}", account.name, token);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod password;
pub mod provider;
pub mod reconcile;
pub mod token;

pub use errors::{AuthError, AuthResult};
pub use manager::Authenticator;
pub use models::{
    Account, AccountId, AccountUpdate, AccountView, ProviderProfile, PublicAccountView,
    RegisterRequest, Role, SessionClaims, gravatar_url, normalize_email, validate_email,
};
pub use password::PasswordHasher;
pub use provider::{ProfileFetcher, ProviderError, StaticProfileFetcher};
pub use reconcile::IdentityReconciler;
pub use token::TokenService;
