//! Identity-provider seam.
//!
//! Provider adapters (Facebook, GitHub, ...) live outside this crate. Each one
//! turns a provider access token into a normalized [`ProviderProfile`]; the
//! authentication core never branches on which provider it is talking to.

use super::models::ProviderProfile;
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a provider adapter
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the access token
    #[error("Access token rejected by provider")]
    Rejected,

    /// Network or provider-side failure
    #[error("Provider request failed: {0}")]
    Unavailable(String),
}

/// Fetches the profile behind a provider access token
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Provider name stamped on the profiles this fetcher returns
    fn provider(&self) -> &str;

    /// Exchange `access_token` for the user's profile
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;
}

/// Fetcher that answers every token with the same profile.
///
/// Useful for wiring tests and local development without a provider account.
pub struct StaticProfileFetcher {
    profile: ProviderProfile,
}

impl StaticProfileFetcher {
    pub fn new(profile: ProviderProfile) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ProfileFetcher for StaticProfileFetcher {
    fn provider(&self) -> &str {
        &self.profile.provider
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, ProviderError> {
        Ok(self.profile.clone())
    }
}
