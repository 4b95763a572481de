//! Authenticator: the entry points callers use to log in and manage accounts.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        Account, AccountId, AccountUpdate, ProviderProfile, RegisterRequest, Role,
        normalize_email, validate_email,
    },
    password::{PasswordHasher, validate_password},
    provider::ProfileFetcher,
    reconcile::IdentityReconciler,
    token::TokenService,
};
use crate::config::AuthConfig;
use crate::db::{AccountRepository, StoreError};
use crate::logging::log_security_event;
use std::sync::Arc;

/// Authentication manager
///
/// Holds no mutable state of its own; every call works against the current
/// contents of the account repository.
#[derive(Clone)]
pub struct Authenticator {
    accounts: Arc<dyn AccountRepository>,
    hasher: PasswordHasher,
    tokens: TokenService,
    reconciler: IdentityReconciler,
}

impl Authenticator {
    /// Create a new authenticator
    ///
    /// # Arguments
    ///
    /// * `accounts` - Credential store
    /// * `config` - Signing key, token TTL and password cost, fixed for the
    ///   lifetime of the authenticator
    ///
    /// # Errors
    ///
    /// * `AuthError::HashingFailed` - Password cost parameters are invalid
    pub fn new(accounts: Arc<dyn AccountRepository>, config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            hasher: PasswordHasher::new(&config.password)?,
            tokens: TokenService::new(&config.token),
            reconciler: IdentityReconciler::new(Arc::clone(&accounts)),
            accounts,
        })
    }

    /// Session token service used for issuing and verifying tokens
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a password account
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - Email format invalid
    /// * `AuthError::WeakPassword` - Password too short
    /// * `AuthError::EmailTaken` - Email already exists
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<Account> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.password)?;

        let password_hash = self.hasher.hash(&request.password)?;
        let mut account = Account::new(&email, request.name.as_deref(), Some(password_hash));
        account.custom_avatar = request.avatar.filter(|a| !a.trim().is_empty());

        let account = self
            .accounts
            .create(&account)
            .await
            .map_err(email_conflict)?;

        tracing::info!(account_id = %account.id, "Registered password account");
        Ok(account)
    }

    /// Log in with email and password
    ///
    /// # Returns
    ///
    /// * `AuthResult<(Account, String)>` - Account and a fresh session token
    ///
    /// # Errors
    ///
    /// * `AuthError::NotFound` - No account with this email
    /// * `AuthError::InvalidCredentials` - Wrong password, or no password set
    pub async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthResult<(Account, String)> {
        let email = normalize_email(email);
        let Some(account) = self.accounts.find_by_email(&email).await? else {
            log_security_event("failed_login", None, "Password login for unknown email");
            return Err(AuthError::NotFound);
        };

        let verified = account
            .password_hash
            .as_deref()
            .is_some_and(|hash| self.hasher.verify(password, hash));
        if !verified {
            log_security_event("failed_login", Some(account.id), "Invalid password attempt");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(account.id)?;
        tracing::debug!(account_id = %account.id, "Password login succeeded");
        Ok((account, token))
    }

    /// Log in with a provider profile, creating or linking the account as needed
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidProfile` - Profile lacks provider, external id or email
    pub async fn authenticate_with_provider(
        &self,
        profile: &ProviderProfile,
    ) -> AuthResult<(Account, String)> {
        let account = self.reconciler.reconcile(profile).await?;
        let token = self.tokens.issue(account.id)?;
        tracing::debug!(
            account_id = %account.id,
            provider = %profile.provider,
            "Provider login succeeded"
        );
        Ok((account, token))
    }

    /// Fetch the profile behind a provider access token and log in with it
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Blank access token
    /// * `AuthError::ProviderUnavailable` - Adapter could not produce a profile
    /// * `AuthError::InvalidProfile` - Profile incomplete or stamped with another provider
    pub async fn authenticate_with_provider_token(
        &self,
        fetcher: &dyn ProfileFetcher,
        access_token: &str,
    ) -> AuthResult<(Account, String)> {
        if access_token.trim().is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let profile = fetcher.fetch_profile(access_token).await.map_err(|e| {
            tracing::warn!(provider = %fetcher.provider(), error = %e, "Profile fetch failed");
            AuthError::ProviderUnavailable(e.to_string())
        })?;

        if profile.provider != fetcher.provider() {
            return Err(AuthError::InvalidProfile(format!(
                "{} adapter returned a {} profile",
                fetcher.provider(),
                profile.provider
            )));
        }

        self.authenticate_with_provider(&profile).await
    }

    /// Resolve the account behind a session token
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidToken` / `AuthError::ExpiredToken` - Token rejected
    /// * `AuthError::NotFound` - Account deleted after the token was issued
    pub async fn authenticate_with_token(&self, token: &str) -> AuthResult<Account> {
        let account_id = self.tokens.verify(token)?;
        self.load_account(account_id).await
    }

    /// Change (or, for provider-only accounts, set) the password
    ///
    /// Provider-only accounts have no current password; for them `current` must be empty.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - `current` does not match
    /// * `AuthError::WeakPassword` - New password too short
    pub async fn change_password(
        &self,
        account_id: AccountId,
        current: &str,
        new_password: &str,
    ) -> AuthResult<Account> {
        let mut account = self.load_account(account_id).await?;

        let current_ok = match account.password_hash.as_deref() {
            Some(hash) => self.hasher.verify(current, hash),
            None => current.is_empty(),
        };
        if !current_ok {
            log_security_event(
                "failed_password_change",
                Some(account.id),
                "Current password did not match",
            );
            return Err(AuthError::InvalidCredentials);
        }

        validate_password(new_password)?;
        account.password_hash = Some(self.hasher.hash(new_password)?);
        account.touch();

        let account = self.accounts.save(&account).await?;
        log_security_event("password_changed", Some(account.id), "Password updated");
        Ok(account)
    }

    /// Update the owner-editable fields (name, email)
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - New email format invalid
    /// * `AuthError::EmailTaken` - New email belongs to another account
    pub async fn update_account(
        &self,
        account_id: AccountId,
        update: AccountUpdate,
    ) -> AuthResult<Account> {
        let mut account = self.load_account(account_id).await?;

        if let Some(email) = update.email {
            let email = normalize_email(&email);
            validate_email(&email)?;
            account.set_email(&email);
        }
        if let Some(name) = update.name {
            account.set_name(&name);
        }
        account.touch();

        self.accounts.save(&account).await.map_err(email_conflict)
    }

    /// Set an explicit avatar, or clear it to fall back to the email-derived one
    pub async fn set_avatar(
        &self,
        account_id: AccountId,
        avatar: Option<String>,
    ) -> AuthResult<Account> {
        let mut account = self.load_account(account_id).await?;
        account.custom_avatar = avatar.filter(|a| !a.trim().is_empty());
        account.touch();
        Ok(self.accounts.save(&account).await?)
    }

    /// Check that `account` holds `required` (elevated accounts hold every role)
    ///
    /// # Errors
    ///
    /// * `AuthError::Forbidden` - Role too low
    pub fn require_role(account: &Account, required: Role) -> AuthResult<()> {
        if account.role.satisfies(required) {
            Ok(())
        } else {
            log_security_event(
                "forbidden",
                Some(account.id),
                &format!("Role {} required, account has {}", required, account.role),
            );
            Err(AuthError::Forbidden)
        }
    }

    async fn load_account(&self, account_id: AccountId) -> AuthResult<Account> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::NotFound)
    }
}

/// Unique violations on account writes outside reconciliation can only be the email.
fn email_conflict(err: StoreError) -> AuthError {
    match err {
        StoreError::DuplicateKey(_) => AuthError::EmailTaken,
        StoreError::NotFound => AuthError::NotFound,
        other => AuthError::Store(other),
    }
}
