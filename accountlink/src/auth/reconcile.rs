//! Identity reconciliation: mapping provider profiles onto accounts.
//!
//! Lookup order is fixed. An existing `(provider, external_id)` binding always
//! wins over an email match, because a returning user's email can change at the
//! provider while the provider's id for them cannot. Only when no binding exists
//! is the email consulted, which links a new provider to an existing password or
//! provider account. Otherwise a new account is created.

use super::{
    errors::{AuthError, AuthResult},
    models::{Account, ProviderProfile, normalize_email},
};
use crate::db::{AccountRepository, StoreError};
use crate::logging::log_security_event;
use std::sync::Arc;

/// Attempts before giving up on a profile whose writes keep hitting unique constraints
const MAX_ATTEMPTS: usize = 3;

/// Finds or creates the account owning a provider profile
#[derive(Clone)]
pub struct IdentityReconciler {
    accounts: Arc<dyn AccountRepository>,
}

impl IdentityReconciler {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Resolve `profile` to its account, creating or linking as needed.
    ///
    /// Reconciling the same profile twice yields the same account; only the
    /// display fields are rewritten.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidProfile` - Missing provider, external id or email
    /// * `AuthError::Conflict` - Concurrent writers won every attempt
    /// * `AuthError::Store` - Storage failure
    pub async fn reconcile(&self, profile: &ProviderProfile) -> AuthResult<Account> {
        profile.validate()?;
        let email = normalize_email(&profile.email);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_reconcile(profile, &email).await {
                // Someone else created or bound this identity between our lookup
                // and our write; the next pass finds their account.
                Err(AuthError::Store(StoreError::DuplicateKey(constraint))) => {
                    tracing::debug!(
                        attempt,
                        constraint = %constraint,
                        provider = %profile.provider,
                        "Reconcile write lost a race, retrying as lookup"
                    );
                }
                other => return other,
            }
        }

        tracing::warn!(
            provider = %profile.provider,
            attempts = MAX_ATTEMPTS,
            "Gave up reconciling provider profile"
        );
        Err(AuthError::Conflict)
    }

    async fn try_reconcile(&self, profile: &ProviderProfile, email: &str) -> AuthResult<Account> {
        // Returning provider user
        if let Some(mut account) = self
            .accounts
            .find_by_provider_binding(&profile.provider, &profile.external_id)
            .await?
        {
            if account.email != email {
                self.note_email_drift(&account, profile, email).await?;
            }
            refresh_display_fields(&mut account, profile);
            return Ok(self.accounts.save(&account).await?);
        }

        // New provider for a known email
        if let Some(found) = self.accounts.find_by_email(email).await? {
            if let Some(previous) = found
                .provider_id(&profile.provider)
                .filter(|id| *id != profile.external_id)
            {
                tracing::warn!(
                    account_id = %found.id,
                    provider = %profile.provider,
                    previous_external_id = %previous,
                    "Replacing provider binding on account"
                );
            }
            // Writes only this provider's binding; the others stay as stored
            let mut account = self
                .accounts
                .bind_provider(found.id, &profile.provider, &profile.external_id)
                .await?;
            refresh_display_fields(&mut account, profile);
            let account = self.accounts.save(&account).await?;
            log_security_event(
                "provider_linked",
                Some(account.id),
                &format!("Linked {} identity to existing account", profile.provider),
            );
            return Ok(account);
        }

        let mut account = Account::new(email, profile.name.as_deref(), None);
        account.bind_provider(&profile.provider, &profile.external_id);
        account.custom_avatar = non_blank(profile.avatar.as_deref());
        let account = self.accounts.create(&account).await?;
        tracing::info!(
            account_id = %account.id,
            provider = %profile.provider,
            "Created account from provider profile"
        );
        Ok(account)
    }

    /// The binding matched but the provider now reports another email. The
    /// binding decides the account and the stored email is left as it is, even
    /// when the reported email belongs to a different account.
    async fn note_email_drift(
        &self,
        account: &Account,
        profile: &ProviderProfile,
        email: &str,
    ) -> AuthResult<()> {
        match self.accounts.find_by_email(email).await? {
            Some(owner) if owner.id != account.id => {
                log_security_event(
                    "provider_email_conflict",
                    Some(account.id),
                    &format!(
                        "{} profile reports an email owned by account {}; keeping binding owner",
                        profile.provider, owner.id
                    ),
                );
            }
            _ => {
                tracing::info!(
                    account_id = %account.id,
                    provider = %profile.provider,
                    "Provider reports a different email; keeping stored email"
                );
            }
        }
        Ok(())
    }
}

/// Providers are considered fresher than stored display fields.
fn refresh_display_fields(account: &mut Account, profile: &ProviderProfile) {
    if let Some(name) = non_blank(profile.name.as_deref()) {
        account.set_name(&name);
    }
    if let Some(avatar) = non_blank(profile.avatar.as_deref()) {
        account.custom_avatar = Some(avatar);
    }
    account.touch();
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryAccountRepository, StoreResult};
    use crate::auth::AccountId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profile(provider: &str, external_id: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            provider: provider.to_string(),
            external_id: external_id.to_string(),
            name: Some("Test Name".to_string()),
            email: email.to_string(),
            avatar: Some("test.jpg".to_string()),
        }
    }

    fn reconciler(repo: &MemoryAccountRepository) -> IdentityReconciler {
        IdentityReconciler::new(Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn test_new_user() {
        let repo = MemoryAccountRepository::new();
        let existing = repo.create(&Account::new("a@a.com", Some("user"), None)).await.unwrap();

        let created = reconciler(&repo)
            .reconcile(&profile("facebook", "123", "test@test.com"))
            .await
            .unwrap();

        assert_ne!(created.id, existing.id);
        assert_eq!(created.provider_id("facebook"), Some("123"));
        assert_eq!(created.name, "Test Name");
        assert_eq!(created.email, "test@test.com");
        assert_eq!(created.avatar_url(), "test.jpg");
        assert!(!created.has_password());
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn test_email_already_registered_links_provider() {
        let repo = MemoryAccountRepository::new();
        let existing = repo
            .create(&Account::new("a@a.com", Some("user"), Some("hash".into())))
            .await
            .unwrap();

        let linked = reconciler(&repo)
            .reconcile(&profile("github", "123", "A@A.com"))
            .await
            .unwrap();

        assert_eq!(linked.id, existing.id);
        assert_eq!(linked.provider_id("github"), Some("123"));
        assert_eq!(linked.name, "Test Name");
        assert_eq!(linked.email, "a@a.com");
        assert_eq!(linked.avatar_url(), "test.jpg");
        assert_eq!(linked.password_hash.as_deref(), Some("hash"));
    }

    #[tokio::test]
    async fn test_provider_id_takes_precedence_over_email() {
        let repo = MemoryAccountRepository::new();
        let mut bound = Account::new("a@a.com", Some("user"), None);
        bound.bind_provider("github", "123");
        let bound = repo.create(&bound).await.unwrap();
        let other = repo.create(&Account::new("b@b.com", None, None)).await.unwrap();

        let resolved = reconciler(&repo)
            .reconcile(&profile("github", "123", "b@b.com"))
            .await
            .unwrap();

        assert_eq!(resolved.id, bound.id);
        assert_eq!(resolved.email, "a@a.com");

        let untouched = repo.find_by_id(other.id).await.unwrap().unwrap();
        assert!(untouched.providers.is_empty());
    }

    #[tokio::test]
    async fn test_email_match_replaces_binding_for_same_provider() {
        let repo = MemoryAccountRepository::new();
        let mut existing = Account::new("a@a.com", Some("user"), None);
        existing.bind_provider("github", "1");
        existing.bind_provider("facebook", "fb");
        let existing = repo.create(&existing).await.unwrap();

        let relinked = reconciler(&repo)
            .reconcile(&profile("github", "2", "a@a.com"))
            .await
            .unwrap();

        assert_eq!(relinked.id, existing.id);
        assert_eq!(relinked.provider_id("github"), Some("2"));
        assert_eq!(relinked.provider_id("facebook"), Some("fb"));
        assert!(repo.find_by_provider_binding("github", "1").await.unwrap().is_none());
        let by_new = repo.find_by_provider_binding("github", "2").await.unwrap();
        assert_eq!(by_new.map(|a| a.id), Some(existing.id));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let repo = MemoryAccountRepository::new();
        let engine = reconciler(&repo);
        let github = ProviderProfile {
            provider: "github".into(),
            external_id: "123".into(),
            name: Some("user".into()),
            email: "b@b.com".into(),
            avatar: None,
        };

        let first = engine.reconcile(&github).await.unwrap();
        let second = engine.reconcile(&github).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.provider_id("github"), Some("123"));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_profile_fields_keep_stored_values() {
        let repo = MemoryAccountRepository::new();
        let engine = reconciler(&repo);
        engine.reconcile(&profile("github", "123", "b@b.com")).await.unwrap();

        let mut sparse = profile("github", "123", "b@b.com");
        sparse.name = Some("  ".into());
        sparse.avatar = None;
        let account = engine.reconcile(&sparse).await.unwrap();

        assert_eq!(account.name, "Test Name");
        assert_eq!(account.avatar_url(), "test.jpg");
    }

    #[tokio::test]
    async fn test_invalid_profile_rejected() {
        let repo = MemoryAccountRepository::new();
        let err = reconciler(&repo)
            .reconcile(&profile("github", "123", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidProfile(_)));
        assert!(repo.is_empty().await);
    }

    /// Store whose first `create` loses to a concurrently created account.
    struct RacingRepository {
        inner: MemoryAccountRepository,
        winner: Account,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl AccountRepository for RacingRepository {
        async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_provider_binding(
            &self,
            provider: &str,
            external_id: &str,
        ) -> StoreResult<Option<Account>> {
            self.inner.find_by_provider_binding(provider, external_id).await
        }

        async fn create(&self, account: &Account) -> StoreResult<Account> {
            if self.creates.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.create(&self.winner).await?;
            }
            self.inner.create(account).await
        }

        async fn save(&self, account: &Account) -> StoreResult<Account> {
            self.inner.save(account).await
        }

        async fn bind_provider(
            &self,
            account_id: AccountId,
            provider: &str,
            external_id: &str,
        ) -> StoreResult<Account> {
            self.inner.bind_provider(account_id, provider, external_id).await
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_on_create_falls_back_to_lookup() {
        let github = profile("github", "123", "b@b.com");
        let mut winner = Account::new("b@b.com", Some("winner"), None);
        winner.bind_provider("github", "123");

        let repo = RacingRepository {
            inner: MemoryAccountRepository::new(),
            winner: winner.clone(),
            creates: AtomicUsize::new(0),
        };
        let inner = repo.inner.clone();
        let engine = IdentityReconciler::new(Arc::new(repo));

        let account = engine.reconcile(&github).await.unwrap();

        assert_eq!(account.id, winner.id);
        assert_eq!(account.name, "Test Name");
        assert_eq!(inner.len().await, 1);
    }

    /// Store whose email lookups stall, so concurrent links interleave between
    /// lookup and write.
    struct SlowEmailLookup(MemoryAccountRepository);

    #[async_trait]
    impl AccountRepository for SlowEmailLookup {
        async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
            let found = self.0.find_by_email(email).await;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            found
        }

        async fn find_by_provider_binding(
            &self,
            provider: &str,
            external_id: &str,
        ) -> StoreResult<Option<Account>> {
            self.0.find_by_provider_binding(provider, external_id).await
        }

        async fn create(&self, account: &Account) -> StoreResult<Account> {
            self.0.create(account).await
        }

        async fn save(&self, account: &Account) -> StoreResult<Account> {
            self.0.save(account).await
        }

        async fn bind_provider(
            &self,
            account_id: AccountId,
            provider: &str,
            external_id: &str,
        ) -> StoreResult<Account> {
            self.0.bind_provider(account_id, provider, external_id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_links_keep_every_binding() {
        let inner = MemoryAccountRepository::new();
        let existing = inner
            .create(&Account::new("a@a.com", Some("user"), None))
            .await
            .unwrap();
        let engine = IdentityReconciler::new(Arc::new(SlowEmailLookup(inner.clone())));

        let github = profile("github", "gh-1", "a@a.com");
        let facebook = profile("facebook", "fb-1", "a@a.com");
        let (first, second) = tokio::join!(engine.reconcile(&github), engine.reconcile(&facebook));

        assert_eq!(first.unwrap().id, existing.id);
        assert_eq!(second.unwrap().id, existing.id);

        let stored = inner.find_by_id(existing.id).await.unwrap().unwrap();
        assert_eq!(stored.provider_id("github"), Some("gh-1"));
        assert_eq!(stored.provider_id("facebook"), Some("fb-1"));
        assert_eq!(inner.len().await, 1);
    }

    /// Store that always reports a unique violation on write.
    struct AlwaysDuplicate(MemoryAccountRepository);

    #[async_trait]
    impl AccountRepository for AlwaysDuplicate {
        async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
            self.0.find_by_email(email).await
        }

        async fn find_by_provider_binding(
            &self,
            provider: &str,
            external_id: &str,
        ) -> StoreResult<Option<Account>> {
            self.0.find_by_provider_binding(provider, external_id).await
        }

        async fn create(&self, _account: &Account) -> StoreResult<Account> {
            Err(StoreError::DuplicateKey("accounts_email_key".to_string()))
        }

        async fn save(&self, _account: &Account) -> StoreResult<Account> {
            Err(StoreError::DuplicateKey("accounts_email_key".to_string()))
        }

        async fn bind_provider(
            &self,
            _account_id: AccountId,
            _provider: &str,
            _external_id: &str,
        ) -> StoreResult<Account> {
            Err(StoreError::DuplicateKey(
                "account_providers_external_key".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_persistent_duplicate_key_is_a_conflict() {
        let engine = IdentityReconciler::new(Arc::new(AlwaysDuplicate(
            MemoryAccountRepository::new(),
        )));
        let err = engine
            .reconcile(&profile("github", "123", "b@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }
}
