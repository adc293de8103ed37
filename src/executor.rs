//! SQL execution over `may_postgres`.
//!
//! [`SqlExecutor`] is the seam every PostgreSQL consumer goes through: the
//! store, the migration runner and transactions all execute statements via
//! this trait, so timing, tracing and error conversion live in one place.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::time::Instant;
use thiserror::Error;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] PostgresError),
    /// Query could not be built or bound
    #[error("Query error: {0}")]
    QueryError(String),
    /// A row did not map onto the expected type.
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Execution error: {0}")]
    Other(String),
}

/// Statement execution, with or without an enclosing transaction.
///
/// Implemented by a bare client ([`MayPostgresExecutor`]) and by
/// [`crate::transaction::Transaction`], so callers can run the same code
/// inside or outside a transaction.
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecError>;

    /// Execute a query that must return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, ExecError>;

    /// Execute a query and return all rows.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecError>;

    /// Execute a query returning zero or one row.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, ExecError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(ExecError::QueryError(format!(
                "expected at most one row, query returned {n}"
            ))),
        }
    }
}

/// Runs statements directly on a client, each in its own implicit transaction.
pub struct MayPostgresExecutor {
    client: Client,
}

impl std::fmt::Debug for MayPostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MayPostgresExecutor").finish_non_exhaustive()
    }
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    /// Start a transaction on this executor's connection.
    ///
    /// The connection must not be used for anything else until the
    /// transaction is committed, rolled back or dropped (which rolls back).
    pub fn begin(&self) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::new(self.client.clone())
    }

    /// Start a transaction with a specific isolation level
    pub fn begin_with_isolation(
        &self,
        isolation_level: crate::transaction::IsolationLevel,
    ) -> Result<crate::transaction::Transaction, crate::transaction::TransactionError> {
        crate::transaction::Transaction::new_with_isolation(self.client.clone(), isolation_level)
    }

    /// `SELECT 1` on this connection.
    pub fn check_health(&self) -> Result<bool, ExecError> {
        crate::connection::check_connection_health(&self.client)
            .map_err(|e| ExecError::Other(format!("Health check error: {e}")))
    }
}

impl SqlExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecError> {
        timed(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, ExecError> {
        timed(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecError> {
        timed(query, || self.client.query(query, params))
    }
}

/// Runs one statement with a span, duration histogram and error counter around it.
pub(crate) fn timed<T>(
    query: &str,
    run: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, ExecError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();

    let start = Instant::now();
    let result = run().map_err(|e| {
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_store_error();
        log::debug!("statement failed: {query}: {e}");
        ExecError::PostgresError(e)
    });

    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_query_duration(start.elapsed());
    #[cfg(not(feature = "metrics"))]
    let _ = start;

    result
}
