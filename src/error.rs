//! Error types for keyed store operations

use thiserror::Error;

use crate::types::FieldType;

/// Errors raised while translating between record fields and storage columns
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    /// No translation is registered for the field type
    #[error("No translation registered for field type '{0}'")]
    Unsupported(FieldType),

    /// A value of one type was handed to a translation for another
    #[error("Type mismatch: expected {expected}, got {found}")]
    Mismatch {
        /// Field type of the translation
        expected: FieldType,
        /// Description of the value that was supplied
        found: String,
    },

    /// A NULL came back for a field that cannot hold one
    #[error("Column '{0}' is NULL but the field is not optional")]
    UnexpectedNull(String),

    /// The value would be rounded or refused by its column
    #[error("Value {value} cannot be stored as {field_type}: {reason}")]
    Unrepresentable {
        field_type: FieldType,
        value: String,
        reason: String,
    },
}

impl TranslationError {
    pub fn mismatch(expected: FieldType, found: impl std::fmt::Debug) -> Self {
        Self::Mismatch {
            expected,
            found: format!("{:?}", found),
        }
    }

    pub fn unrepresentable(
        field_type: FieldType,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Unrepresentable {
            field_type,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during keyed store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No connection pool installed")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Classify a driver error, separating lease failures and key collisions
    /// from ordinary statement errors
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                Self::connection("timed out waiting for a connection lease")
            }
            sqlx::Error::PoolClosed => Self::connection("connection pool is closed"),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Self::conflict(db.message().to_string())
            }
            other => Self::Sql(other),
        }
    }

    /// Whether this error came from a primary key collision
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err = StoreError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_other_errors_stay_sql() {
        let err = StoreError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Sql(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_translation_error_display() {
        let err = StoreError::from(TranslationError::Unsupported(FieldType::Decimal));
        assert_eq!(
            err.to_string(),
            "Translation error: No translation registered for field type 'decimal'"
        );
    }

    #[test]
    fn test_mismatch_describes_value() {
        let err = TranslationError::mismatch(FieldType::I64, "abc");
        assert_eq!(err.to_string(), "Type mismatch: expected i64, got \"abc\"");
    }
}
