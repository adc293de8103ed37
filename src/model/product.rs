use super::validation::{
    serialize_money, FieldErrors, Input, COST_DECIMAL_PLACES, COST_MAX_DIGITS, MAX_NAME_LENGTH,
};
use crate::query::FromRow;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

pub const TABLE: &str = "products";
pub const VERBOSE_NAME: &str = "product";

/// Something a machine can dispense, with its unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: i32,
    pub name: String,
    #[serde(serialize_with = "serialize_money")]
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub cost: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub cost: Option<Decimal>,
}

impl ProductPatch {
    pub fn parse(body: &Map<String, Value>, partial: bool) -> Result<Self, FieldErrors> {
        let (patch, errors) = Self::read(body, partial);
        errors.into_result()?;
        Ok(patch)
    }

    /// Every field that parsed, plus the errors for the rest. Lets callers
    /// add store-backed errors to the same response.
    pub fn read(body: &Map<String, Value>, partial: bool) -> (Self, FieldErrors) {
        let mut input = Input::new(body, partial);
        let patch = Self {
            name: input.string("name", MAX_NAME_LENGTH),
            cost: input.non_negative_decimal("cost", COST_MAX_DIGITS, COST_DECIMAL_PLACES),
        };
        (patch, input.into_errors())
    }

    pub fn into_new(self) -> Option<NewProduct> {
        Some(NewProduct {
            name: self.name?,
            cost: self.cost?,
        })
    }

    pub fn merge(self, current: &Product) -> NewProduct {
        NewProduct {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            cost: self.cost.unwrap_or(current.cost),
        }
    }
}

impl Product {
    pub fn from_new(id: i32, new: NewProduct) -> Self {
        Self {
            id,
            name: new.name,
            cost: new.cost,
        }
    }
}

impl FromRow for Product {
    fn from_row(row: &may_postgres::Row) -> Result<Self, may_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            cost: row.try_get("cost")?,
        })
    }
}
