//! `MigrationRecord` - rows of the `vendstock_migrations` state table

use crate::query::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// `SHA-256` checksum of the migration's DDL
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
}

impl FromRow for MigrationRecord {
    fn from_row(row: &may_postgres::Row) -> Result<Self, may_postgres::Error> {
        Ok(Self {
            version: row.try_get("version")?,
            name: row.try_get("name")?,
            checksum: row.try_get("checksum")?,
            applied_at: row.try_get("applied_at")?,
            execution_time_ms: row.try_get("execution_time_ms")?,
        })
    }
}
