//! # Database Errors
//!
//! ```text
//! sqlx::Error ──► DbError ──► ApiError (apps/api) ──► {"error": "..."}
//! ```
//!
//! Constraint failures are recognised from SQLite's message text, which is
//! the only place SQLite names the offending columns:
//!
//! | SQLite message                                      | DbError              |
//! |-----------------------------------------------------|----------------------|
//! | `UNIQUE constraint failed: prescription.number, …`  | `UniqueViolation`    |
//! | `FOREIGN KEY constraint failed`                     | `ForeignKeyViolation`|
//! | anything else from the engine                       | `QueryFailed`        |

use thiserror::Error;

/// Column list SQLite reports when the per-day prescription number index fires.
const PRESCRIPTION_NUMBER_FIELD: &str = "prescription.number";

const UNIQUE_PREFIX: &str = "UNIQUE constraint failed: ";

#[derive(Debug, Error)]
pub enum DbError {
    /// A row looked up by key does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` holds the comma-separated `table.column` list of the index.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored data that cannot be decoded, or a library failure.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl ToString) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// True when the per-day prescription number index rejected a write.
    pub fn is_duplicate_prescription_number(&self) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.starts_with(PRESCRIPTION_NUMBER_FIELD))
    }
}

fn classify(message: &str) -> DbError {
    if let Some(columns) = message.strip_prefix(UNIQUE_PREFIX) {
        DbError::duplicate(columns, "unknown")
    } else if message.contains("FOREIGN KEY constraint failed") {
        DbError::ForeignKeyViolation {
            message: message.to_string(),
        }
    } else {
        DbError::QueryFailed(message.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => classify(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("JSON encoding failed: {}", err))
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_prescription_number_detection() {
        let err = classify("UNIQUE constraint failed: prescription.number, prescription.prescription_day");
        assert!(err.is_duplicate_prescription_number());

        let err = classify("UNIQUE constraint failed: medicine.barcode");
        assert!(!err.is_duplicate_prescription_number());
        assert!(matches!(err, DbError::UniqueViolation { field, .. } if field == "medicine.barcode"));
    }

    #[test]
    fn test_other_engine_messages() {
        assert!(matches!(
            classify("FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation { .. }
        ));
        assert!(matches!(classify("disk I/O error"), DbError::QueryFailed(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found("Prescription", 42);
        assert_eq!(err.to_string(), "Prescription not found: 42");
    }
}
