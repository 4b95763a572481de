//! Authentication data models.

use super::errors::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Account ID type
pub type AccountId = Uuid;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"));

/// Trim and lower-case an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Reject strings that are not shaped like `local@domain.tld`.
pub fn validate_email(email: &str) -> AuthResult<()> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail(format!("'{email}' is not an email address")))
    }
}

/// Default avatar for an email: a gravatar identicon keyed by the SHA-256 of the address.
///
/// Gravatar accepts SHA-256 hashes as well as the legacy MD5 form. URLs built here
/// therefore differ from MD5-based gravatar URLs for the same email, although both
/// resolve to the same image.
pub fn gravatar_url(email: &str) -> String {
    let hash = hex::encode(Sha256::digest(email.as_bytes()));
    format!("https://gravatar.com/avatar/{hash}?d=identicon")
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Regular,
    Elevated,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Elevated => "elevated",
        }
    }

    /// Elevated accounts satisfy every role requirement.
    pub fn satisfies(&self, required: Role) -> bool {
        *self == Role::Elevated || *self == required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Role::Regular),
            "elevated" => Ok(Role::Elevated),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Account model: one person, reachable by password and/or any number of providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    /// Explicit avatar; when `None` the avatar follows the email
    pub custom_avatar: Option<String>,
    /// Provider name -> external user id
    pub providers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build a fresh `Regular` account. The email is normalized and a blank name
    /// falls back to the email's local part.
    pub fn new(email: &str, name: Option<&str>, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        let mut account = Self {
            id: Uuid::new_v4(),
            name: String::new(),
            email: normalize_email(email),
            password_hash,
            role: Role::Regular,
            custom_avatar: None,
            providers: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        account.set_name(name.unwrap_or_default());
        account
    }

    /// Set the display name, deriving it from the email when blank.
    pub fn set_name(&mut self, name: &str) {
        let name = name.trim();
        self.name = if name.is_empty() {
            local_part(&self.email).to_string()
        } else {
            name.to_string()
        };
    }

    /// Change the email. A derived avatar follows automatically.
    pub fn set_email(&mut self, email: &str) {
        self.email = normalize_email(email);
    }

    /// Avatar shown for this account
    pub fn avatar_url(&self) -> String {
        match &self.custom_avatar {
            Some(url) => url.clone(),
            None => gravatar_url(&self.email),
        }
    }

    /// External id bound for `provider`, if any
    pub fn provider_id(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider).map(String::as_str)
    }

    /// Bind `provider` to `external_id`, returning the id it replaced.
    pub fn bind_provider(&mut self, provider: &str, external_id: &str) -> Option<String> {
        self.providers
            .insert(provider.to_string(), external_id.to_string())
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Fields safe to show to anyone
    pub fn public_view(&self) -> PublicAccountView {
        PublicAccountView {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar_url(),
        }
    }

    /// Fields shown to the account owner and elevated accounts
    pub fn full_view(&self) -> AccountView {
        AccountView {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar_url(),
            role: self.role,
            providers: self.providers.keys().cloned().collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public projection of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccountView {
    pub id: AccountId,
    pub name: String,
    pub avatar: String,
}

/// Full projection of an account. Lists linked provider names, never external ids or hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub role: Role,
    pub providers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized profile supplied by an identity-provider adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider name, e.g. "github"
    pub provider: String,
    /// The provider's user id
    pub external_id: String,
    pub name: Option<String>,
    pub email: String,
    pub avatar: Option<String>,
}

impl ProviderProfile {
    /// Reject profiles that cannot be reconciled.
    pub fn validate(&self) -> AuthResult<()> {
        if self.provider.trim().is_empty() {
            return Err(AuthError::InvalidProfile("missing provider".to_string()));
        }
        if self.external_id.trim().is_empty() {
            return Err(AuthError::InvalidProfile("missing external id".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(AuthError::InvalidProfile("missing email".to_string()));
        }
        Ok(())
    }
}

/// Password registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Owner-editable account fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// JWT claims for session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // Account ID
    pub iat: i64,    // Issued at timestamp
    pub exp: i64,    // Expiration timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_derived_from_email() {
        let account = Account::new("Test@Example.com", Some("  "), None);
        assert_eq!(account.email, "test@example.com");
        assert_eq!(account.name, "test");
    }

    #[test]
    fn test_avatar_follows_email_until_overridden() {
        let mut account = Account::new("a@a.com", Some("user"), None);
        assert_eq!(account.avatar_url(), gravatar_url("a@a.com"));
        assert!(account.avatar_url().starts_with("https://gravatar.com/avatar/"));

        account.set_email("test@example.com");
        assert_eq!(account.avatar_url(), gravatar_url("test@example.com"));

        account.custom_avatar = Some("test.jpg".to_string());
        account.set_email("other@example.com");
        assert_eq!(account.avatar_url(), "test.jpg");
    }

    #[test]
    fn test_gravatar_uses_sha256_hash() {
        assert_eq!(
            gravatar_url("a@a.com"),
            "https://gravatar.com/avatar/7dcb0cd247aa94896e665c337696a7be18d387a78d6d55b4854b7ff7d5925042?d=identicon"
        );
    }

    #[test]
    fn test_bind_provider_overwrites() {
        let mut account = Account::new("a@a.com", None, None);
        assert_eq!(account.bind_provider("github", "1"), None);
        assert_eq!(account.bind_provider("github", "2"), Some("1".to_string()));
        assert_eq!(account.provider_id("github"), Some("2"));
        assert_eq!(account.provider_id("facebook"), None);
    }

    #[test]
    fn test_views_never_expose_hash() {
        let mut account = Account::new("a@a.com", Some("user"), Some("$argon2id$secret".into()));
        account.bind_provider("github", "gh-user-external");

        let json = serde_json::to_string(&account.full_view()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("gh-user-external"));
        assert!(json.contains("github"));

        let public = account.public_view();
        assert_eq!(public.id, account.id);
        assert_eq!(public.name, "user");
        assert_eq!(public.avatar, account.avatar_url());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("a@a.com").is_ok());
        assert!(matches!(validate_email("invalid"), Err(AuthError::InvalidEmail(_))));
        assert!(validate_email("a b@c.com").is_err());
    }

    #[test]
    fn test_role_satisfies() {
        assert!(Role::Elevated.satisfies(Role::Regular));
        assert!(Role::Regular.satisfies(Role::Regular));
        assert!(!Role::Regular.satisfies(Role::Elevated));
        assert_eq!("elevated".parse::<Role>(), Ok(Role::Elevated));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_profile_validation() {
        let profile = ProviderProfile {
            provider: "github".into(),
            external_id: "".into(),
            name: None,
            email: "b@b.com".into(),
            avatar: None,
        };
        assert!(matches!(profile.validate(), Err(AuthError::InvalidProfile(_))));
    }
}
