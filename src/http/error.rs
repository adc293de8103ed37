use crate::model::validation::NON_FIELD_ERRORS;
use crate::model::FieldErrors;
use crate::store::StoreError;
use serde_json::{json, Value};
use thiserror::Error;

/// Everything a request can fail with, each mapped to one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("JSON parse error - {0}")]
    MalformedBody(String),
    #[error("not found")]
    NotFound,
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::MalformedBody(_) => 400,
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::Internal(_) => 500,
            ApiError::Unavailable(_) => 503,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::MalformedBody(_) => json!({ "detail": self.to_string() }),
            ApiError::NotFound => json!({ "detail": "Not found." }),
            ApiError::MethodNotAllowed(method) => {
                json!({ "detail": format!("Method \"{method}\" not allowed.") })
            }
            ApiError::Unavailable(_) => {
                json!({ "detail": "Service temporarily unavailable, try again later." })
            }
            ApiError::Internal(_) => json!({ "detail": "A server error occurred." }),
        }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity(message) => {
                ApiError::Validation(FieldErrors::single(NON_FIELD_ERRORS, message))
            }
            StoreError::PoolTimeout(message) => {
                log::warn!("no store connection available: {message}");
                ApiError::Unavailable(message)
            }
            StoreError::Backend(message) => {
                log::error!("store failure: {message}");
                ApiError::Internal(message)
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("could not serialise response: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Validation(FieldErrors::new()).status(), 400);
        assert_eq!(ApiError::MalformedBody("eof".into()).status(), 400);
        assert_eq!(ApiError::NotFound.status(), 404);
        assert_eq!(ApiError::MethodNotAllowed("PUT".into()).status(), 405);
        assert_eq!(ApiError::Internal("boom".into()).status(), 500);
        assert_eq!(ApiError::Unavailable("timeout".into()).status(), 503);
    }

    #[test]
    fn test_integrity_error_becomes_non_field_error() {
        let err = ApiError::from(StoreError::Integrity("duplicate key".into()));
        assert_eq!(err.status(), 400);
        assert_eq!(err.body(), json!({ "non_field_errors": ["duplicate key"] }));
    }

    #[test]
    fn test_pool_timeout_becomes_unavailable() {
        let err = ApiError::from(StoreError::PoolTimeout("30s".into()));
        assert_eq!(err.status(), 503);
    }

    #[test]
    fn test_detail_bodies() {
        assert_eq!(ApiError::NotFound.body(), json!({ "detail": "Not found." }));
        assert_eq!(
            ApiError::MethodNotAllowed("DELETE".into()).body(),
            json!({ "detail": "Method \"DELETE\" not allowed." })
        );
        assert_eq!(
            ApiError::MalformedBody("expected value at line 1 column 1".into()).body(),
            json!({ "detail": "JSON parse error - expected value at line 1 column 1" })
        );
    }
}
