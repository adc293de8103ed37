//! Migrator - applies compiled-in migrations and tracks them in the state table

use super::checksum::{calculate_checksum, validate_checksum};
use super::error::MigrationError;
use super::lock::acquire_migration_lock;
use super::migration::Migration;
use super::record::MigrationRecord;
use super::schema_manager::SchemaManager;
use super::state_table;
use super::status::{MigrationStatus, PendingMigration};
use crate::executor::MayPostgresExecutor;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Core migration execution engine
///
/// Every change runs in its own transaction holding the migration advisory
/// lock, so concurrent runners (several replicas starting at once) apply
/// each migration exactly once.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Sort `migrations` by version, rejecting duplicate versions.
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        migrations.sort_by_key(|m| m.version());
        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version() == pair[1].version())
        {
            return Err(MigrationError::DuplicateVersion(pair[0].version()));
        }
        Ok(Self { migrations })
    }

    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Compare compiled-in migrations with the state table.
    ///
    /// Fails if an applied migration is missing from the binary or its DDL
    /// no longer hashes to the stored checksum.
    pub fn status(&self, executor: &MayPostgresExecutor) -> Result<MigrationStatus, MigrationError> {
        self.initialize(executor)?;
        let applied = state_table::applied_migrations(executor)?;
        self.reconcile(applied)
    }

    /// Apply all pending migrations; returns how many were applied.
    pub fn up(&self, executor: &MayPostgresExecutor) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;
        let mut applied_count = 0;

        for pending in &status.pending {
            let Some(migration) = self.find(pending.version) else {
                continue;
            };
            if self.apply(executor, migration, &pending.checksum)? {
                applied_count += 1;
            }
        }

        Ok(applied_count)
    }

    /// Roll back the most recently applied migration, if any.
    pub fn down(&self, executor: &MayPostgresExecutor) -> Result<Option<MigrationRecord>, MigrationError> {
        self.initialize(executor)?;

        let tx = executor.begin()?;
        acquire_migration_lock(&tx)?;

        let Some(record) = state_table::latest_applied(&tx)? else {
            tx.commit()?;
            return Ok(None);
        };
        let migration = self
            .find(record.version)
            .ok_or_else(|| MigrationError::MissingMigration {
                version: record.version,
                name: record.name.clone(),
            })?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(record.version, &record.name).entered();

        migration
            .down(&SchemaManager::new(&tx))
            .map_err(|e| execution_failed(migration, e))?;
        state_table::remove_migration_record(&tx, record.version)?;
        tx.commit()?;

        log::info!("Rolled back migration {} ({})", record.version, record.name);
        Ok(Some(record))
    }

    fn initialize(&self, executor: &MayPostgresExecutor) -> Result<(), MigrationError> {
        let tx = executor.begin()?;
        acquire_migration_lock(&tx)?;
        state_table::initialize_state_table(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Returns `false` when another runner applied the migration first.
    fn apply(
        &self,
        executor: &MayPostgresExecutor,
        migration: &dyn Migration,
        checksum: &str,
    ) -> Result<bool, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(migration.version(), migration.name()).entered();

        let tx = executor.begin()?;
        acquire_migration_lock(&tx)?;

        if state_table::is_applied(&tx, migration.version())? {
            tx.commit()?;
            log::debug!("Migration {} already applied by another runner", migration.version());
            return Ok(false);
        }

        let start = Instant::now();
        migration
            .up(&SchemaManager::new(&tx))
            .map_err(|e| execution_failed(migration, e))?;
        let execution_time_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        state_table::record_migration(
            &tx,
            migration.version(),
            migration.name(),
            checksum,
            execution_time_ms,
        )?;
        tx.commit()?;

        log::info!(
            "Applied migration {} ({}) in {}ms",
            migration.version(),
            migration.name(),
            execution_time_ms
        );
        Ok(true)
    }

    fn find(&self, version: i64) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.version() == version)
            .map(|m| m.as_ref())
    }

    /// Split compiled-in migrations into applied and pending against `applied` rows.
    pub fn reconcile(&self, applied: Vec<MigrationRecord>) -> Result<MigrationStatus, MigrationError> {
        for record in &applied {
            let migration = self
                .find(record.version)
                .ok_or_else(|| MigrationError::MissingMigration {
                    version: record.version,
                    name: record.name.clone(),
                })?;
            let current = calculate_checksum(migration)?;
            validate_checksum(migration, &record.checksum, &current)?;
        }

        let mut pending = Vec::new();
        for migration in &self.migrations {
            if applied.iter().any(|r| r.version == migration.version()) {
                continue;
            }
            pending.push(PendingMigration {
                version: migration.version(),
                name: migration.name().to_string(),
                checksum: calculate_checksum(migration.as_ref())?,
            });
        }

        Ok(MigrationStatus { applied, pending })
    }
}

fn execution_failed(migration: &dyn Migration, error: MigrationError) -> MigrationError {
    MigrationError::ExecutionFailed {
        version: migration.version(),
        name: migration.name().to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::inventory_migrations;
    use chrono::Utc;

    struct Raw(i64, &'static str);

    impl Migration for Raw {
        fn name(&self) -> &str {
            self.1
        }
        fn version(&self) -> i64 {
            self.0
        }
        fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            manager.execute(self.1)
        }
        fn down(&self, _manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    fn record_for(migration: &dyn Migration) -> MigrationRecord {
        MigrationRecord {
            version: migration.version(),
            name: migration.name().to_string(),
            checksum: calculate_checksum(migration).expect("checksum"),
            applied_at: Utc::now(),
            execution_time_ms: Some(3),
        }
    }

    #[test]
    fn test_duplicate_versions_are_rejected() {
        let result = Migrator::new(vec![Box::new(Raw(2, "a")), Box::new(Raw(2, "b"))]);
        assert!(matches!(result, Err(MigrationError::DuplicateVersion(2))));
    }

    #[test]
    fn test_migrations_are_sorted_by_version() {
        let migrator = Migrator::new(vec![Box::new(Raw(3, "c")), Box::new(Raw(1, "a"))])
            .expect("valid set");
        let versions: Vec<i64> = migrator.migrations().iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 3]);
    }

    #[test]
    fn test_reconcile_splits_applied_and_pending() {
        let migrator = Migrator::new(vec![Box::new(Raw(1, "a")), Box::new(Raw(2, "b"))])
            .expect("valid set");
        let applied = vec![record_for(&Raw(1, "a"))];

        let status = migrator.reconcile(applied).expect("consistent");
        assert_eq!(status.latest_applied_version(), Some(1));
        assert_eq!(status.next_pending_version(), Some(2));
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_reconcile_detects_edited_migration() {
        let migrator = Migrator::new(vec![Box::new(Raw(1, "CREATE TABLE t (id BIGINT)"))])
            .expect("valid set");
        let mut stale = record_for(&Raw(1, "CREATE TABLE t (id INT)"));
        stale.name = "CREATE TABLE t (id BIGINT)".to_string();

        let err = migrator.reconcile(vec![stale]).expect_err("checksum must differ");
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 1, .. }));
    }

    #[test]
    fn test_reconcile_detects_unknown_applied_migration() {
        let migrator = Migrator::new(Vec::new()).expect("empty set");
        let err = migrator
            .reconcile(vec![record_for(&Raw(9, "gone"))])
            .expect_err("unknown version");
        assert!(matches!(err, MigrationError::MissingMigration { version: 9, .. }));
    }

    #[test]
    fn test_inventory_migrations_are_pending_on_empty_database() {
        let migrator = Migrator::new(inventory_migrations()).expect("valid set");
        let status = migrator.reconcile(Vec::new()).expect("consistent");
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].name, "create_inventory");
    }
}
