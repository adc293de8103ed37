//! Serialising migration runners across processes.
//!
//! Uses a transaction-scoped PostgreSQL advisory lock: it is released
//! automatically when the surrounding transaction commits or rolls back, so
//! a crashed runner can never leave the lock behind.

use crate::executor::{ExecError, SqlExecutor};

/// Advisory lock key shared by every vendstock migration runner ("vendstoc").
pub const MIGRATION_LOCK_KEY: i64 = 0x7665_6e64_7374_6f63;

/// Block until this transaction holds the migration lock.
pub fn acquire_migration_lock(executor: &dyn SqlExecutor) -> Result<(), ExecError> {
    log::debug!("waiting for migration lock {MIGRATION_LOCK_KEY:#x}");
    executor.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])?;
    Ok(())
}
