//! Checksums of the DDL a migration generates

use super::error::MigrationError;
use super::migration::Migration;
use super::schema_manager::SchemaManager;
use sha2::{Digest, Sha256};

/// SHA-256 (hex) of every statement `migration.up()` would run, in order.
pub fn calculate_checksum(migration: &dyn Migration) -> Result<String, MigrationError> {
    let manager = SchemaManager::recording();
    migration.up(&manager)?;

    let mut hasher = Sha256::new();
    for statement in manager.into_statements() {
        hasher.update(statement.as_bytes());
        hasher.update(b";\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Validate checksum against stored value
pub fn validate_checksum(
    migration: &dyn Migration,
    stored_checksum: &str,
    current_checksum: &str,
) -> Result<(), MigrationError> {
    if stored_checksum == current_checksum {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version: migration.version(),
            name: migration.name().to_string(),
            stored: stored_checksum.to_string(),
            current: current_checksum.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RawSql(&'static str);

    impl Migration for RawSql {
        fn name(&self) -> &str {
            "raw"
        }
        fn version(&self) -> i64 {
            1
        }
        fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            manager.execute(self.0)
        }
        fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    #[test]
    fn test_checksum_is_stable_and_hex() {
        let a = calculate_checksum(&RawSql("CREATE TABLE t (id INT)")).expect("checksum");
        let b = calculate_checksum(&RawSql("CREATE TABLE t (id INT)")).expect("checksum");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_changes_with_ddl() {
        let a = calculate_checksum(&RawSql("CREATE TABLE t (id INT)")).expect("checksum");
        let b = calculate_checksum(&RawSql("CREATE TABLE t (id BIGINT)")).expect("checksum");
        assert_ne!(a, b);
        assert!(matches!(
            validate_checksum(&RawSql(""), &a, &b),
            Err(MigrationError::ChecksumMismatch { version: 1, .. })
        ));
    }
}
