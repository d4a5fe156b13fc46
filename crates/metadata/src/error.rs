//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Config(e.to_string())
    }
}

impl From<rubrica_core::Error> for MetadataError {
    fn from(e: rubrica_core::Error) -> Self {
        MetadataError::Corrupt(e.to_string())
    }
}

/// Classify constraint failures reported by either backend.
///
/// Unique violations become `AlreadyExists` and check violations become
/// `Constraint`. Anything else stays a database error.
pub(crate) fn classify(e: sqlx::Error, what: impl FnOnce() -> String) -> MetadataError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            MetadataError::AlreadyExists(what())
        }
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
            MetadataError::Constraint(format!("{}: {}", what(), db_err.message()))
        }
        other => MetadataError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = classify(sqlx::Error::RowNotFound, || "signature".to_string());
        assert!(matches!(err, MetadataError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_core_errors_are_corrupt_rows() {
        let err: MetadataError = rubrica_core::Error::InvalidHash("bad".to_string()).into();
        assert!(matches!(err, MetadataError::Corrupt(_)));
    }
}
