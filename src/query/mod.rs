//! Running `sea-query` statements through a [`SqlExecutor`].
//!
//! Statements are built with `PostgresQueryBuilder`, which yields SQL text
//! plus bound [`Values`]; the helpers here bind those values and map rows
//! through [`FromRow`].

use crate::executor::{ExecError, SqlExecutor};
use may_postgres::Row;
use sea_query::Values;

pub(crate) mod error_handling;
pub(crate) mod value_conversion;

pub use error_handling::{is_integrity_violation, sql_state};
pub use value_conversion::with_converted_params;

/// Types that can be built from a PostgreSQL row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, may_postgres::Error>;
}

/// Run a statement and return the number of affected rows.
pub fn execute_built<E>(executor: &E, sql: &str, values: &Values) -> Result<u64, ExecError>
where
    E: SqlExecutor + ?Sized,
{
    with_converted_params(values, |params| executor.execute(sql, params))
}

/// Run a query and map every row.
pub fn fetch_all<M, E>(executor: &E, sql: &str, values: &Values) -> Result<Vec<M>, ExecError>
where
    M: FromRow,
    E: SqlExecutor + ?Sized,
{
    let rows = with_converted_params(values, |params| executor.query_all(sql, params))?;
    rows.iter().map(parse_row).collect()
}

/// Run a query expected to return at most one row.
pub fn fetch_optional<M, E>(executor: &E, sql: &str, values: &Values) -> Result<Option<M>, ExecError>
where
    M: FromRow,
    E: SqlExecutor + ?Sized,
{
    let row = with_converted_params(values, |params| executor.query_opt(sql, params))?;
    row.as_ref().map(parse_row).transpose()
}

/// Run a query that must return exactly one row, such as `INSERT ... RETURNING`.
pub fn fetch_one<M, E>(executor: &E, sql: &str, values: &Values) -> Result<M, ExecError>
where
    M: FromRow,
    E: SqlExecutor + ?Sized,
{
    let row = with_converted_params(values, |params| executor.query_one(sql, params))?;
    parse_row(&row)
}

fn parse_row<M: FromRow>(row: &Row) -> Result<M, ExecError> {
    M::from_row(row).map_err(|e| ExecError::ParseError(format!("Failed to parse row: {e}")))
}
