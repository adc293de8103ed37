use super::{method_for, resolve_reference, to_json, Resource};
use crate::http::ApiError;
use crate::model::stock_timeline::StockTimelineInput;
use crate::model::NewStockTimeline;
use crate::store::EntityStore;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The stock ledger as a resource: readable, appendable, never rewritten.
pub struct StockTimelineHandler {
    store: Arc<dyn EntityStore>,
}

impl StockTimelineHandler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

impl Resource for StockTimelineHandler {
    fn path(&self) -> &'static str {
        "stock-timeline"
    }

    fn list(&self) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.list_timelines()?)
    }

    fn retrieve(&self, id: i32) -> Result<Value, ApiError> {
        let mut tx = self.store.begin()?;
        to_json(&tx.get_timeline(id)?.ok_or(ApiError::NotFound)?)
    }

    fn create(&self, body: &Map<String, Value>) -> Result<Value, ApiError> {
        let (input, mut errors) = StockTimelineInput::read(body);
        let mut tx = self.store.begin()?;

        let vending_machine = match input.vending_machine {
            Some(pk) => resolve_reference(&mut errors, "vending_machine", pk, |id| tx.get_machine(id))?,
            None => None,
        };
        let product = match input.product {
            Some(pk) => resolve_reference(&mut errors, "product", pk, |id| tx.get_product(id))?,
            None => None,
        };
        errors.into_result()?;

        let (Some(vending_machine), Some(product), Some(quantity)) =
            (vending_machine, product, input.quantity)
        else {
            return Err(super::incomplete("stock timeline"));
        };
        let entry = tx.insert_timeline(&NewStockTimeline {
            vending_machine,
            product,
            quantity,
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
        })?;
        tx.commit()?;

        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_timeline_entry();
        to_json(&entry)
    }

    fn update(&self, _id: i32, _body: &Map<String, Value>, partial: bool) -> Result<Value, ApiError> {
        Err(ApiError::MethodNotAllowed(method_for(partial).to_string()))
    }

    fn destroy(&self, _id: i32) -> Result<(), ApiError> {
        Err(ApiError::MethodNotAllowed("DELETE".to_string()))
    }
}
