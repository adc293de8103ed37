//! The `vendstock_migrations` state table

use super::error::MigrationError;
use super::record::MigrationRecord;
use super::schema_manager::SchemaManager;
use crate::executor::SqlExecutor;
use crate::query::{fetch_all, fetch_optional};
use sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement, Values};

pub const STATE_TABLE: &str = "vendstock_migrations";

const SELECT_RECORDS: &str = "SELECT version, name, checksum, applied_at, execution_time_ms \
                              FROM vendstock_migrations";

pub fn create_state_table() -> TableCreateStatement {
    Table::create()
        .table(STATE_TABLE)
        .if_not_exists()
        .col(ColumnDef::new("version").big_integer().not_null().primary_key())
        .col(ColumnDef::new("name").string_len(255).not_null())
        .col(ColumnDef::new("checksum").string_len(64).not_null())
        .col(
            ColumnDef::new("applied_at")
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(ColumnDef::new("execution_time_ms").big_integer().null())
        .to_owned()
}

pub fn create_state_table_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx_vendstock_migrations_applied_at")
        .table(STATE_TABLE)
        .col("applied_at")
        .to_owned()
}

/// Create the state table and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), MigrationError> {
    let manager = SchemaManager::new(executor);
    manager.create_table(create_state_table())?;
    manager.create_index(create_state_table_index())
}

pub fn applied_migrations(executor: &dyn SqlExecutor) -> Result<Vec<MigrationRecord>, MigrationError> {
    let sql = format!("{SELECT_RECORDS} ORDER BY version ASC");
    Ok(fetch_all(executor, &sql, &Values(Vec::new()))?)
}

pub fn latest_applied(executor: &dyn SqlExecutor) -> Result<Option<MigrationRecord>, MigrationError> {
    let sql = format!("{SELECT_RECORDS} ORDER BY version DESC LIMIT 1");
    Ok(fetch_optional(executor, &sql, &Values(Vec::new()))?)
}

pub fn is_applied(executor: &dyn SqlExecutor, version: i64) -> Result<bool, MigrationError> {
    let row = executor.query_one(
        "SELECT EXISTS (SELECT 1 FROM vendstock_migrations WHERE version = $1)",
        &[&version],
    )?;
    let exists: bool = row
        .try_get(0)
        .map_err(|e| crate::executor::ExecError::ParseError(e.to_string()))?;
    Ok(exists)
}

pub fn record_migration(
    executor: &dyn SqlExecutor,
    version: i64,
    name: &str,
    checksum: &str,
    execution_time_ms: i64,
) -> Result<(), MigrationError> {
    executor.execute(
        "INSERT INTO vendstock_migrations (version, name, checksum, execution_time_ms) \
         VALUES ($1, $2, $3, $4)",
        &[&version, &name, &checksum, &execution_time_ms],
    )?;
    Ok(())
}

pub fn remove_migration_record(executor: &dyn SqlExecutor, version: i64) -> Result<(), MigrationError> {
    executor.execute("DELETE FROM vendstock_migrations WHERE version = $1", &[&version])?;
    Ok(())
}
