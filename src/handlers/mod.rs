//! Per-entity request handlers.
//!
//! A [`Resource`] turns the five CRUD operations into store work inside one
//! transaction. Handlers parse the request body and check the rules that
//! need the store (unique names, existing references) in the same pass, so
//! one response carries both kinds of error. Unique stock pairs are checked
//! once every field is valid, and only then does the handler write. Anything
//! the store still rejects at write or commit time surfaces as a validation
//! error too.

mod product;
mod stock;
mod stock_timeline;
mod vending_machine;

pub use product::ProductHandler;
pub use stock::StockHandler;
pub use stock_timeline::StockTimelineHandler;
pub use vending_machine::VendingMachineHandler;

use crate::http::ApiError;
use crate::model::validation::does_not_exist;
use crate::model::FieldErrors;
use crate::store::{EntityStore, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// CRUD surface of one entity, mounted by the router at `/{path}/`.
pub trait Resource: Send + Sync {
    /// First path segment, e.g. `vending-machine`.
    fn path(&self) -> &'static str;

    fn list(&self) -> Result<Value, ApiError>;

    fn retrieve(&self, id: i32) -> Result<Value, ApiError>;

    fn create(&self, body: &Map<String, Value>) -> Result<Value, ApiError>;

    /// Full (`PUT`) or partial (`PATCH`) update of an existing row.
    fn update(&self, id: i32, body: &Map<String, Value>, partial: bool) -> Result<Value, ApiError>;

    fn destroy(&self, id: i32) -> Result<(), ApiError>;
}

/// The four inventory resources over `store`.
pub fn inventory_resources(store: Arc<dyn EntityStore>) -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(VendingMachineHandler::new(store.clone())),
        Box::new(ProductHandler::new(store.clone())),
        Box::new(StockHandler::new(store.clone())),
        Box::new(StockTimelineHandler::new(store)),
    ]
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn method_for(partial: bool) -> &'static str {
    if partial {
        "PATCH"
    } else {
        "PUT"
    }
}

/// Confirms that a referenced row exists, recording the standard error under
/// `field` when it does not. Returns the id to store.
pub(crate) fn resolve_reference<T>(
    errors: &mut FieldErrors,
    field: &str,
    pk: i64,
    lookup: impl FnOnce(i32) -> Result<Option<T>, StoreError>,
) -> Result<Option<i32>, StoreError> {
    let found = match i32::try_from(pk) {
        Ok(id) => lookup(id)?.map(|_| id),
        Err(_) => None,
    };
    if found.is_none() {
        errors.add(field, does_not_exist(pk));
    }
    Ok(found)
}

/// Required fields were checked during parsing; reaching this is a bug.
pub(crate) fn incomplete(entity: &str) -> ApiError {
    ApiError::Internal(format!("{entity} fields missing after validation"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reference_records_missing_row() {
        let mut errors = FieldErrors::new();
        let found = resolve_reference(&mut errors, "product", 7, |_| Ok(None::<()>)).expect("lookup");
        assert_eq!(found, None);
        assert_eq!(
            errors.get("product"),
            Some(&["Invalid pk \"7\" - object does not exist.".to_string()][..])
        );
    }

    #[test]
    fn test_resolve_reference_out_of_range_skips_lookup() {
        let mut errors = FieldErrors::new();
        let found = resolve_reference(&mut errors, "product", i64::MAX, |_| -> Result<Option<()>, _> {
            panic!("lookup must not run")
        })
        .expect("lookup");
        assert_eq!(found, None);
        assert!(errors.has("product"));
    }

    #[test]
    fn test_resolve_reference_found() {
        let mut errors = FieldErrors::new();
        let found = resolve_reference(&mut errors, "vending_machine", 3, |id| Ok(Some(id))).expect("lookup");
        assert_eq!(found, Some(3));
        assert!(errors.is_empty());
    }
}
