//! What the state table says compared to what the binary ships.

use super::record::MigrationRecord;

/// Applied and pending migrations, both in version order.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<PendingMigration>,
}

/// A compiled-in migration that has not been applied yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    /// Nothing left to apply.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    /// Version `up` would apply first.
    #[must_use]
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}
