//! Migration-specific error types

use crate::executor::ExecError;
use crate::transaction::TransactionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] ExecError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error(
        "Migration '{name}' (version {version}) has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },

    #[error("Applied migration '{name}' (version {version}) is not compiled into this binary")]
    MissingMigration { version: i64, name: String },

    #[error("Two migrations share version {0}")]
    DuplicateVersion(i64),

    #[error("Migration '{name}' (version {version}) failed: {error}")]
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_display() {
        let err = MigrationError::ChecksumMismatch {
            version: 20240601120000,
            name: "create_inventory".to_string(),
            stored: "aaa".to_string(),
            current: "bbb".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("create_inventory"));
        assert!(text.contains("Stored checksum: aaa"));
        assert!(text.contains("Current checksum: bbb"));
    }

    #[test]
    fn test_database_error_conversion() {
        let err: MigrationError = ExecError::QueryError("boom".to_string()).into();
        assert!(matches!(err, MigrationError::Database(_)));
        assert!(err.to_string().contains("boom"));
    }
}
