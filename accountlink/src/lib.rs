//! # accountlink
//!
//! Authentication and identity-linking core for resource APIs.
//!
//! A principal logs in either with an email and password or with a profile from
//! an external identity provider. Either way the result is the same: the
//! [`Account`](auth::Account) plus a signed, time-limited session token that
//! later requests present instead of credentials.
//!
//! One person may reach the same account through a password and any number of
//! providers. Provider profiles are reconciled onto accounts by provider id
//! first and email second, so linking is automatic and stable.
//!
//! ## Core Modules
//!
//! - [`auth`]: hashing, tokens, reconciliation and the [`Authenticator`]
//! - [`db`]: the account repository trait with in-memory and PostgreSQL stores
//! - [`config`]: configuration loaded once at startup
//! - [`logging`]: tracing setup and security events

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;

pub use auth::{
    Account, AccountId, AuthError, AuthResult, Authenticator, ProviderProfile, Role,
};
pub use config::{AuthConfig, ConfigError, PasswordConfig, TokenConfig};
