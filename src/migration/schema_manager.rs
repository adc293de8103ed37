//! SchemaManager - the handle migrations use to change the schema

use super::error::MigrationError;
use crate::executor::SqlExecutor;
use sea_query::{
    IndexCreateStatement, IndexDropStatement, PostgresQueryBuilder, TableCreateStatement,
    TableDropStatement,
};
use std::cell::RefCell;

/// Runs DDL for a migration.
///
/// A manager either executes statements against a connection, or only
/// records them (see [`SchemaManager::recording`]), which is how migration
/// checksums are computed without touching the database.
pub struct SchemaManager<'a> {
    sink: Sink<'a>,
}

enum Sink<'a> {
    Execute(&'a dyn SqlExecutor),
    Record(RefCell<Vec<String>>),
}

impl<'a> SchemaManager<'a> {
    /// Create a new SchemaManager with the given executor
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self {
            sink: Sink::Execute(executor),
        }
    }

    /// A manager that collects SQL instead of running it.
    pub fn recording() -> SchemaManager<'static> {
        SchemaManager {
            sink: Sink::Record(RefCell::new(Vec::new())),
        }
    }

    /// Statements seen so far by a recording manager; empty for an executing one.
    pub fn into_statements(self) -> Vec<String> {
        match self.sink {
            Sink::Record(statements) => statements.into_inner(),
            Sink::Execute(_) => Vec::new(),
        }
    }

    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), MigrationError> {
        self.execute(&table.build(PostgresQueryBuilder))
    }

    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), MigrationError> {
        self.execute(&table.build(PostgresQueryBuilder))
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), MigrationError> {
        self.execute(&index.build(PostgresQueryBuilder))
    }

    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), MigrationError> {
        self.execute(&index.build(PostgresQueryBuilder))
    }

    /// Execute raw SQL
    pub fn execute(&self, sql: &str) -> Result<(), MigrationError> {
        match &self.sink {
            Sink::Execute(executor) => {
                executor.execute(sql, &[])?;
            }
            Sink::Record(statements) => statements.borrow_mut().push(sql.to_string()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{ColumnDef, Table};

    #[test]
    fn test_recording_manager_collects_sql_in_order() {
        let manager = SchemaManager::recording();
        manager
            .create_table(
                Table::create()
                    .table("refills")
                    .col(ColumnDef::new("id").integer().not_null().primary_key())
                    .to_owned(),
            )
            .expect("record create");
        manager.execute("SELECT 1").expect("record raw");

        let statements = manager.into_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE \"refills\""));
        assert_eq!(statements[1], "SELECT 1");
    }
}
