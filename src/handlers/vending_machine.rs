use super::{incomplete, to_json, Resource};
use crate::http::ApiError;
use crate::model::validation::already_exists;
use crate::model::vending_machine::VERBOSE_NAME;
use crate::model::{FieldErrors, VendingMachinePatch};
use crate::store::{EntityStore, StoreError, StoreTx};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct VendingMachineHandler {
    store: Arc<dyn EntityStore>,
}

impl VendingMachineHandler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

fn check_name(tx: &mut dyn StoreTx, name: Option<&str>, except: Option<i32>) -> Result<FieldErrors, StoreError> {
    let mut errors = FieldErrors::new();
    if let Some(name) = name {
        if let Some(existing) = tx.find_machine_by_name(name)? {
            if Some(existing.id) != except {
                errors.add("name", already_exists(VERBOSE_NAME, "name"));
            }
        }
    }
    Ok(errors)
}

impl Resource for VendingMachineHandler {
    fn path(&self) -> &'static str {
        "vending-machine"
    }

    fn list(&self) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.list_machines()?)
    }

    fn retrieve(&self, id: i32) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        let machine = tx.get_machine(id)?.ok_or(ApiError::NotFound)?;
        to_json(&machine)
    }

    fn create(&self, body: &Map<String, Value>) -> Result<Value, ApiError> {
        let (patch, mut errors) = VendingMachinePatch::read(body, false);
        let mut tx = self.store.begin()?;
        errors.extend(check_name(tx.as_mut(), patch.name.as_deref(), None)?);
        errors.into_result()?;

        let new = patch.into_new().ok_or_else(|| incomplete(VERBOSE_NAME))?;
        let machine = tx.insert_machine(&new)?;
        tx.commit()?;

        log::info!("created vending machine {} ({})", machine.id, machine.name);
        to_json(&machine)
    }

    fn update(&self, id: i32, body: &Map<String, Value>, partial: bool) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        let current = tx.get_machine(id)?.ok_or(ApiError::NotFound)?;
        let (patch, mut errors) = VendingMachinePatch::read(body, partial);
        errors.extend(check_name(tx.as_mut(), patch.name.as_deref(), Some(id))?);
        errors.into_result()?;

        let machine = tx
            .update_machine(id, &patch.merge(&current))?
            .ok_or(ApiError::NotFound)?;
        tx.commit()?;

        log::debug!("updated vending machine {id}");
        to_json(&machine)
    }

    fn destroy(&self, id: i32) -> Result<(), ApiError> {
        let mut tx = self.store.begin()?;
        if !tx.delete_machine(id)? {
            return Err(ApiError::NotFound);
        }
        tx.commit()?;
        log::info!("deleted vending machine {id}");
        Ok(())
    }
}
