use super::validation::{FieldErrors, Input, MAX_QUANTITY};
use crate::query::FromRow;
use serde::Serialize;
use serde_json::{Map, Value};

pub const TABLE: &str = "stocks";
/// Name of the unique constraint on (vending_machine, product).
pub const PAIR_CONSTRAINT: &str = "vending_machine_product";

/// How many units of a product a machine currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stock {
    pub id: i32,
    pub vending_machine: i32,
    pub product: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewStock {
    pub vending_machine: i32,
    pub product: i32,
    pub quantity: i32,
}

/// Parsed stock fields. References are kept as raw ids until the handler
/// has confirmed the rows exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockPatch {
    pub vending_machine: Option<i64>,
    pub product: Option<i64>,
    pub quantity: Option<i32>,
}

impl StockPatch {
    pub fn parse(body: &Map<String, Value>, partial: bool) -> Result<Self, FieldErrors> {
        let (patch, errors) = Self::read(body, partial);
        errors.into_result()?;
        Ok(patch)
    }

    /// [`Self::parse`] without giving up the fields that did parse.
    pub fn read(body: &Map<String, Value>, partial: bool) -> (Self, FieldErrors) {
        let mut input = Input::new(body, partial);
        let patch = Self {
            vending_machine: input.reference("vending_machine"),
            product: input.reference("product"),
            quantity: input.non_negative_integer("quantity", MAX_QUANTITY),
        };
        (patch, input.into_errors())
    }
}

impl Stock {
    pub fn from_new(id: i32, new: NewStock) -> Self {
        Self {
            id,
            vending_machine: new.vending_machine,
            product: new.product,
            quantity: new.quantity,
        }
    }

    pub fn pair(&self) -> (i32, i32) {
        (self.vending_machine, self.product)
    }
}

impl FromRow for Stock {
    fn from_row(row: &may_postgres::Row) -> Result<Self, may_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            vending_machine: row.try_get("vending_machine_id")?,
            product: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
        })
    }
}
