//! Schema migrations.
//!
//! Migrations are compiled into the binary and implement [`Migration`]. The
//! [`Migrator`] applies them in version order, recording each one in the
//! `vendstock_migrations` table together with a SHA-256 checksum of the DDL
//! it generates. A migration whose DDL changes after it was applied stops
//! the runner with [`MigrationError::ChecksumMismatch`].
//!
//! ```rust,no_run
//! use vendstock::migration::{Migration, MigrationError, SchemaManager};
//! use sea_query::{ColumnDef, Table};
//!
//! pub struct CreateRefillsTable;
//!
//! impl Migration for CreateRefillsTable {
//!     fn name(&self) -> &str {
//!         "create_refills_table"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20240701090000
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         let table = Table::create()
//!             .table("refills")
//!             .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
//!             .to_owned();
//!         manager.create_table(table)
//!     }
//!
//!     fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         manager.drop_table(Table::drop().table("refills").to_owned())
//!     }
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod lock;
pub mod m20240601120000_create_inventory;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod schema_manager;
pub mod state_table;
pub mod status;

pub use error::MigrationError;
pub use migration::Migration;
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use schema_manager::SchemaManager;
pub use status::{MigrationStatus, PendingMigration};

use crate::executor::MayPostgresExecutor;

/// Every migration shipped with vendstock, in any order.
pub fn inventory_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(m20240601120000_create_inventory::CreateInventory)]
}

/// Apply pending migrations on application startup.
///
/// Fails fast: the caller should not serve traffic if this returns an error.
pub fn startup_migrations(executor: &MayPostgresExecutor) -> Result<usize, MigrationError> {
    let migrator = Migrator::new(inventory_migrations())?;
    let applied = migrator.up(executor)?;

    if applied > 0 {
        log::info!("Applied {} migration(s) on startup", applied);
    } else {
        log::debug!("No pending migrations to apply");
    }
    Ok(applied)
}
