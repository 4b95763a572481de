//! Authentication configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.
//! Configuration is loaded once at startup and handed to constructors by value; nothing
//! in the crate reads the environment afterwards.

use chrono::Duration;

/// Complete authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session token configuration
    pub token: TokenConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC signing secret (required)
    pub secret: String,
    /// Token lifetime
    pub ttl: Duration,
}

/// Password hashing configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Server-side pepper appended before hashing (required)
    pub pepper: String,
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
    /// Argon2 iteration count
    pub iterations: u32,
    /// Argon2 lanes
    pub parallelism: u32,
}

impl TokenConfig {
    pub const DEFAULT_TTL_DAYS: i64 = 7;
    /// Longest accepted token lifetime
    pub const MAX_TTL_DAYS: i64 = 365;

    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(Self::DEFAULT_TTL_DAYS),
        }
    }

    /// Convert a day count into a lifetime within `1..=MAX_TTL_DAYS`.
    pub fn ttl_from_days(days: i64) -> Result<Duration, ConfigError> {
        let out_of_range = || ConfigError::Invalid {
            var: "TOKEN_TTL_DAYS".to_string(),
            reason: format!("Must be between 1 and {} (got {days})", Self::MAX_TTL_DAYS),
        };
        if !(1..=Self::MAX_TTL_DAYS).contains(&days) {
            return Err(out_of_range());
        }
        Duration::try_days(days).ok_or_else(out_of_range)
    }
}

impl PasswordConfig {
    /// Argon2id defaults recommended by OWASP
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl AuthConfig {
    /// Read `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal outside development
        let _ = dotenvy::dotenv();
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `JWT_SECRET`: token signing secret (required)
    /// - `TOKEN_TTL_DAYS`: token lifetime in days, 1 to 365 (default: 7)
    /// - `PASSWORD_PEPPER`: password pepper (required)
    /// - `ARGON2_MEMORY_KIB`: memory cost (default: 19456)
    /// - `ARGON2_ITERATIONS`: iterations (default: 2)
    /// - `ARGON2_PARALLELISM`: lanes (default: 1)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or `TOKEN_TTL_DAYS` is out of range
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let defaults = PasswordConfig::new(String::new());
        let ttl = TokenConfig::ttl_from_days(parse_env_or(
            "TOKEN_TTL_DAYS",
            TokenConfig::DEFAULT_TTL_DAYS,
        ))?;

        Ok(AuthConfig {
            token: TokenConfig { secret, ttl },
            password: PasswordConfig {
                pepper,
                memory_kib: parse_env_or("ARGON2_MEMORY_KIB", defaults.memory_kib),
                iterations: parse_env_or("ARGON2_ITERATIONS", defaults.iterations),
                parallelism: parse_env_or("ARGON2_PARALLELISM", defaults.parallelism),
            },
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.token.ttl <= Duration::zero()
            || self.token.ttl > Duration::days(TokenConfig::MAX_TTL_DAYS)
        {
            return Err(ConfigError::Invalid {
                var: "TOKEN_TTL_DAYS".to_string(),
                reason: format!(
                    "Must be greater than 0 and at most {} days",
                    TokenConfig::MAX_TTL_DAYS
                ),
            });
        }

        if self.password.pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.password.iterations == 0 || self.password.parallelism == 0 {
            return Err(ConfigError::Invalid {
                var: "ARGON2_ITERATIONS".to_string(),
                reason: "Iterations and parallelism must be greater than 0".to_string(),
            });
        }

        if self.password.memory_kib < self.password.parallelism.saturating_mul(8) {
            return Err(ConfigError::Invalid {
                var: "ARGON2_MEMORY_KIB".to_string(),
                reason: format!(
                    "Must be at least 8 KiB per lane ({} lanes)",
                    self.password.parallelism
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub(crate) fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
