use super::validation::{FieldErrors, Input, MAX_QUANTITY};
use crate::query::FromRow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const TABLE: &str = "stock_timelines";

/// One immutable ledger entry: the state of a stock row right after a write.
///
/// The references are plain ids. They are not checked against the parent
/// tables once written, so entries outlive deleted machines and products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockTimeline {
    pub id: i32,
    pub vending_machine: i32,
    pub product: i32,
    pub quantity: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewStockTimeline {
    pub vending_machine: i32,
    pub product: i32,
    pub quantity: i32,
    pub timestamp: DateTime<Utc>,
}

/// Fields accepted when a ledger entry is appended through the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockTimelineInput {
    pub vending_machine: Option<i64>,
    pub product: Option<i64>,
    pub quantity: Option<i32>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StockTimelineInput {
    pub fn parse(body: &Map<String, Value>) -> Result<Self, FieldErrors> {
        let (parsed, errors) = Self::read(body);
        errors.into_result()?;
        Ok(parsed)
    }

    pub fn read(body: &Map<String, Value>) -> (Self, FieldErrors) {
        let mut input = Input::new(body, false);
        let parsed = Self {
            vending_machine: input.reference("vending_machine"),
            product: input.reference("product"),
            quantity: input.non_negative_integer("quantity", MAX_QUANTITY),
            timestamp: input.datetime("timestamp"),
        };
        (parsed, input.into_errors())
    }
}

impl StockTimeline {
    pub fn from_new(id: i32, new: NewStockTimeline) -> Self {
        Self {
            id,
            vending_machine: new.vending_machine,
            product: new.product,
            quantity: new.quantity,
            timestamp: new.timestamp,
        }
    }
}

impl FromRow for StockTimeline {
    fn from_row(row: &may_postgres::Row) -> Result<Self, may_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            vending_machine: row.try_get("vending_machine_id")?,
            product: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}
