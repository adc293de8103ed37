//! Binding `sea-query` values as `may_postgres` parameters.

use crate::executor::ExecError;
use chrono::{DateTime, Utc};
use may_postgres::types::ToSql;
use rust_decimal::Decimal;
use sea_query::{Value, Values};

/// Convert SeaQuery values to may_postgres parameters and run `f` with them.
///
/// NULLs keep the Rust type of their variant so the server-side type check
/// still matches the column.
///
/// # Errors
///
/// Returns `ExecError::QueryError` for value types the schema never binds.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, ExecError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, ExecError>,
{
    let owned = values
        .iter()
        .map(to_sql_param)
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

fn to_sql_param(value: &Value) -> Result<Box<dyn ToSql>, ExecError> {
    let param: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| s.to_string())),
        Value::Decimal(v) => Box::new(v.as_ref().map(|d| {
            let d: &Decimal = d;
            *d
        })),
        Value::ChronoDateTimeUtc(v) => Box::new(v.as_ref().map(|ts| {
            let ts: &DateTime<Utc> = ts;
            *ts
        })),
        other => {
            return Err(ExecError::QueryError(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(param)
}
