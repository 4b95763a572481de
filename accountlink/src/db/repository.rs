//! Repository trait definitions for testability and dependency injection.
//!
//! The authentication core only sees [`AccountRepository`]; storage engines plug
//! in behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::collections::BTreeMap;

use super::errors::{StoreError, StoreResult};
use crate::auth::{Account, AccountId};

/// Trait for account storage operations
///
/// Implementations must reject a second account with the same email and a
/// second binding of the same `(provider, external_id)` with
/// [`StoreError::DuplicateKey`].
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find account by ID
    async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Find account by normalized email
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// Find the account bound to `external_id` at `provider`
    async fn find_by_provider_binding(
        &self,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Option<Account>>;

    /// Insert a new account with its provider bindings
    async fn create(&self, account: &Account) -> StoreResult<Account>;

    /// Overwrite an existing account's own fields. Provider bindings are left
    /// as stored; the returned account carries the stored bindings.
    async fn save(&self, account: &Account) -> StoreResult<Account>;

    /// Bind `provider` to `external_id` on an existing account, replacing only
    /// that provider's previous id. Other bindings are untouched, so concurrent
    /// links of different providers all survive.
    async fn bind_provider(
        &self,
        account_id: AccountId,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Account>;
}

const ACCOUNT_COLUMNS: &str =
    "a.id, a.name, a.email, a.password_hash, a.role, a.custom_avatar, a.created_at, a.updated_at";

/// Default PostgreSQL implementation of `AccountRepository`
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, row: Option<PgRow>) -> StoreResult<Option<Account>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut account = account_from_row(&row)?;

        let bindings = sqlx::query(
            "SELECT provider, external_id FROM account_providers WHERE account_id = $1",
        )
        .bind(account.id)
        .fetch_all(&self.pool)
        .await?;

        account.providers = bindings
            .iter()
            .map(|r| (r.get("provider"), r.get("external_id")))
            .collect::<BTreeMap<String, String>>();

        Ok(Some(account))
    }

    async fn insert_bindings(
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
    ) -> StoreResult<()> {
        for (provider, external_id) in &account.providers {
            sqlx::query(
                "INSERT INTO account_providers (account_id, provider, external_id) VALUES ($1, $2, $3)",
            )
            .bind(account.id)
            .bind(provider)
            .bind(external_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn account_from_row(r: &PgRow) -> StoreResult<Account> {
    let role: String = r.get("role");
    Ok(Account {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        role: role.parse().map_err(StoreError::Backend)?,
        custom_avatar: r.get("custom_avatar"),
        providers: BTreeMap::new(),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
        updated_at: r.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.load(row).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE a.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        self.load(row).await
    }

    async fn find_by_provider_binding(
        &self,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts a
             JOIN account_providers p ON p.account_id = a.id
             WHERE p.provider = $1 AND p.external_id = $2"
        ))
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        self.load(row).await
    }

    async fn create(&self, account: &Account) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password_hash, role, custom_avatar, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.custom_avatar)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_bindings(&mut tx, account).await?;
        tx.commit().await?;

        Ok(account.clone())
    }

    async fn save(&self, account: &Account) -> StoreResult<Account> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET name = $2, email = $3, password_hash = $4, role = $5, custom_avatar = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.custom_avatar)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        self.find_by_id(account.id).await?.ok_or(StoreError::NotFound)
    }

    async fn bind_provider(
        &self,
        account_id: AccountId,
        provider: &str,
        external_id: &str,
    ) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE accounts SET updated_at = NOW() WHERE id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            INSERT INTO account_providers (account_id, provider, external_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, provider) DO UPDATE SET external_id = EXCLUDED.external_id
            "#,
        )
        .bind(account_id)
        .bind(provider)
        .bind(external_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.find_by_id(account_id).await?.ok_or(StoreError::NotFound)
    }
}
