use super::{incomplete, to_json, Resource};
use crate::http::ApiError;
use crate::model::product::VERBOSE_NAME;
use crate::model::validation::already_exists;
use crate::model::{FieldErrors, ProductPatch};
use crate::store::{EntityStore, StoreError, StoreTx};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct ProductHandler {
    store: Arc<dyn EntityStore>,
}

impl ProductHandler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

fn check_name(tx: &mut dyn StoreTx, name: Option<&str>, except: Option<i32>) -> Result<FieldErrors, StoreError> {
    let mut errors = FieldErrors::new();
    if let Some(existing) = name.map(|n| tx.find_product_by_name(n)).transpose()?.flatten() {
        if Some(existing.id) != except {
            errors.add("name", already_exists(VERBOSE_NAME, "name"));
        }
    }
    Ok(errors)
}

impl Resource for ProductHandler {
    fn path(&self) -> &'static str {
        "product"
    }

    fn list(&self) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.list_products()?)
    }

    fn retrieve(&self, id: i32) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.get_product(id)?.ok_or(ApiError::NotFound)?)
    }

    fn create(&self, body: &Map<String, Value>) -> Result<Value, ApiError> {
        let (patch, mut errors) = ProductPatch::read(body, false);
        let mut tx = self.store.begin()?;
        errors.extend(check_name(tx.as_mut(), patch.name.as_deref(), None)?);
        errors.into_result()?;

        let new = patch.into_new().ok_or_else(|| incomplete(VERBOSE_NAME))?;
        let product = tx.insert_product(&new)?;
        tx.commit()?;

        log::info!("created product {} ({}) at {}", product.id, product.name, product.cost);
        to_json(&product)
    }

    fn update(&self, id: i32, body: &Map<String, Value>, partial: bool) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        let current = tx.get_product(id)?.ok_or(ApiError::NotFound)?;
        let (patch, mut errors) = ProductPatch::read(body, partial);
        errors.extend(check_name(tx.as_mut(), patch.name.as_deref(), Some(id))?);
        errors.into_result()?;

        let product = tx
            .update_product(id, &patch.merge(&current))?
            .ok_or(ApiError::NotFound)?;
        tx.commit()?;

        log::debug!("updated product {id} to cost {}", product.cost);
        to_json(&product)
    }

    fn destroy(&self, id: i32) -> Result<(), ApiError> {
        let mut tx = self.store.begin()?;
        if !tx.delete_product(id)? {
            return Err(ApiError::NotFound);
        }
        tx.commit()?;
        log::info!("deleted product {id}");
        Ok(())
    }
}
