use super::{incomplete, resolve_reference, to_json, Resource};
use crate::http::ApiError;
use crate::ledger::record_stock_write;
use crate::model::validation::{not_unique_together, NON_FIELD_ERRORS};
use crate::model::{FieldErrors, NewStock, StockPatch};
use crate::store::{EntityStore, StoreError, StoreTx};
use serde_json::{Map, Value};
use std::sync::Arc;

const PAIR_FIELDS: [&str; 2] = ["vending_machine", "product"];

/// Stock rows. Every successful create or update also appends a ledger
/// entry in the same transaction.
pub struct StockHandler {
    store: Arc<dyn EntityStore>,
}

impl StockHandler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

/// Resolved references; `None` where the field was not supplied.
struct References {
    vending_machine: Option<i32>,
    product: Option<i32>,
}

/// Look up the supplied references, adding a message to `errors` for each
/// one that does not exist.
fn resolve(tx: &mut dyn StoreTx, patch: &StockPatch, errors: &mut FieldErrors) -> Result<References, StoreError> {
    let vending_machine = match patch.vending_machine {
        Some(pk) => resolve_reference(errors, "vending_machine", pk, |id| tx.get_machine(id))?,
        None => None,
    };
    let product = match patch.product {
        Some(pk) => resolve_reference(errors, "product", pk, |id| tx.get_product(id))?,
        None => None,
    };
    Ok(References {
        vending_machine,
        product,
    })
}

fn check_pair(tx: &mut dyn StoreTx, new: &NewStock, except: Option<i32>) -> Result<FieldErrors, StoreError> {
    let mut errors = FieldErrors::new();
    if let Some(existing) = tx.find_stock_by_pair(new.vending_machine, new.product)? {
        if Some(existing.id) != except {
            errors.add(NON_FIELD_ERRORS, not_unique_together(&PAIR_FIELDS));
        }
    }
    Ok(errors)
}

impl Resource for StockHandler {
    fn path(&self) -> &'static str {
        "stock"
    }

    fn list(&self) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.list_stocks()?)
    }

    fn retrieve(&self, id: i32) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.get_stock(id)?.ok_or(ApiError::NotFound)?)
    }

    fn create(&self, body: &Map<String, Value>) -> Result<Value, ApiError> {
        let (patch, mut errors) = StockPatch::read(body, false);
        let mut tx = self.store.begin()?;
        let refs = resolve(tx.as_mut(), &patch, &mut errors)?;
        errors.into_result()?;

        let new = NewStock {
            vending_machine: refs.vending_machine.ok_or_else(|| incomplete("stock"))?,
            product: refs.product.ok_or_else(|| incomplete("stock"))?,
            quantity: patch.quantity.ok_or_else(|| incomplete("stock"))?,
        };
        check_pair(tx.as_mut(), &new, None)?.into_result()?;

        let stock = tx.insert_stock(&new)?;
        record_stock_write(tx.as_mut(), &stock)?;
        tx.commit()?;

        log::info!(
            "created stock {}: machine {} product {} quantity {}",
            stock.id,
            stock.vending_machine,
            stock.product,
            stock.quantity
        );
        to_json(&stock)
    }

    fn update(&self, id: i32, body: &Map<String, Value>, partial: bool) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        let current = tx.get_stock(id)?.ok_or(ApiError::NotFound)?;
        let (patch, mut errors) = StockPatch::read(body, partial);
        let refs = resolve(tx.as_mut(), &patch, &mut errors)?;
        errors.into_result()?;

        let new = NewStock {
            vending_machine: refs.vending_machine.unwrap_or(current.vending_machine),
            product: refs.product.unwrap_or(current.product),
            quantity: patch.quantity.unwrap_or(current.quantity),
        };
        check_pair(tx.as_mut(), &new, Some(id))?.into_result()?;

        let stock = tx.update_stock(id, &new)?.ok_or(ApiError::NotFound)?;
        record_stock_write(tx.as_mut(), &stock)?;
        tx.commit()?;

        log::debug!("updated stock {id} to quantity {}", stock.quantity);
        to_json(&stock)
    }

    fn destroy(&self, id: i32) -> Result<(), ApiError> {
        let mut tx = self.store.begin()?;
        if !tx.delete_stock(id)? {
            return Err(ApiError::NotFound);
        }
        tx.commit()?;
        log::info!("deleted stock {id}");
        Ok(())
    }
}
