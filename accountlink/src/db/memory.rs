//! In-process account store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::repository::AccountRepository;
use crate::auth::{Account, AccountId};

/// `AccountRepository` kept in a map behind one async mutex.
///
/// Uniqueness is checked and the write applied under the same lock, so the
/// constraints hold under concurrent use just like the database ones.
#[derive(Clone, Default)]
pub struct MemoryAccountRepository {
    accounts: Arc<Mutex<HashMap<AccountId, Account>>>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    /// Remove an account; deletion belongs to the callers of this crate.
    pub async fn remove(&self, id: AccountId) -> Option<Account> {
        self.accounts.lock().await.remove(&id)
    }
}

fn check_unique(accounts: &HashMap<AccountId, Account>, candidate: &Account) -> StoreResult<()> {
    for other in accounts.values().filter(|a| a.id != candidate.id) {
        if other.email == candidate.email {
            return Err(StoreError::DuplicateKey("accounts_email_key".to_string()));
        }
        let collides = candidate
            .providers
            .iter()
            .any(|(provider, external_id)| other.provider_id(provider) == Some(external_id.as_str()));
        if collides {
            return Err(StoreError::DuplicateKey(
                "account_providers_external_key".to_string(),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_provider_binding(
        &self,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|a| a.provider_id(provider) == Some(external_id))
            .cloned())
    }

    async fn create(&self, account: &Account) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.id) {
            return Err(StoreError::DuplicateKey("accounts_pkey".to_string()));
        }
        check_unique(&accounts, account)?;
        accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn save(&self, account: &Account) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let Some(stored) = accounts.get(&account.id) else {
            return Err(StoreError::NotFound);
        };
        let updated = Account {
            providers: stored.providers.clone(),
            ..account.clone()
        };
        check_unique(&accounts, &updated)?;
        accounts.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn bind_provider(
        &self,
        account_id: AccountId,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Account> {
        let mut accounts = self.accounts.lock().await;
        let taken = accounts
            .values()
            .any(|a| a.id != account_id && a.provider_id(provider) == Some(external_id));
        if taken {
            return Err(StoreError::DuplicateKey(
                "account_providers_external_key".to_string(),
            ));
        }
        let account = accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        account.bind_provider(provider, external_id);
        account.touch();
        Ok(account.clone())
    }
}
