//! Migration trait definition

use super::error::MigrationError;
use super::schema_manager::SchemaManager;

/// A versioned schema change.
///
/// `up` and `down` must be deterministic: the migrator hashes the statements
/// `up` generates to detect edits to already-applied migrations.
pub trait Migration: Send + Sync {
    /// Get the migration name (human-readable identifier)
    fn name(&self) -> &str;

    /// Get the migration version (timestamp: YYYYMMDDHHMMSS)
    fn version(&self) -> i64;

    /// Apply the migration (forward migration)
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;

    /// Rollback the migration (reverse migration)
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;
}
