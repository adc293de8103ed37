//! Classifying PostgreSQL errors.

use crate::executor::ExecError;

/// SQLSTATE class for integrity constraint violations (unique, foreign key, check, not null).
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

/// The five-character SQLSTATE of a server error, if there is one.
pub fn sql_state(error: &ExecError) -> Option<&str> {
    match error {
        ExecError::PostgresError(pg_error) => pg_error.code().map(|state| state.code()),
        _ => None,
    }
}

/// Whether the server rejected the statement because it would break a constraint.
pub fn is_integrity_violation(error: &ExecError) -> bool {
    sql_state(error).is_some_and(|code| code.starts_with(INTEGRITY_CONSTRAINT_CLASS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_server_errors_have_no_state() {
        let err = ExecError::QueryError("bad".to_string());
        assert_eq!(sql_state(&err), None);
        assert!(!is_integrity_violation(&err));
    }
}
