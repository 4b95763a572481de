//! Credential store error types.

use thiserror::Error;

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint (email, or provider + external id) rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The record to update does not exist
    #[error("Record not found")]
    NotFound,

    /// Any other storage failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the error is a unique-constraint violation
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::DuplicateKey(
                db_err.constraint().unwrap_or("unique constraint").to_string(),
            ),
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Result type for credential store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn test_other_errors_map_to_backend() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_duplicate_key());
    }
}
