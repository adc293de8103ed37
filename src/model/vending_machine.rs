use super::validation::{FieldErrors, Input, MAX_NAME_LENGTH};
use crate::query::FromRow;
use serde::Serialize;
use serde_json::{Map, Value};

pub const TABLE: &str = "vending_machines";
pub const VERBOSE_NAME: &str = "vending machine";

/// A machine at some location that dispenses products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendingMachine {
    pub id: i32,
    pub name: String,
    pub location: String,
    pub is_active: bool,
}

/// Column values for an insert or a full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVendingMachine {
    pub name: String,
    pub location: String,
    pub is_active: bool,
}

/// Validated request fields; `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendingMachinePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

impl VendingMachinePatch {
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
            location: input.string("location", MAX_NAME_LENGTH),
            is_active: input.boolean("is_active"),
        };
        (patch, input.into_errors())
    }

    /// Values for a new row; `is_active` defaults to `true`.
    ///
    /// Only meaningful after a non-partial parse, which guarantees the
    /// required fields are present.
    pub fn into_new(self) -> Option<NewVendingMachine> {
        Some(NewVendingMachine {
            name: self.name?,
            location: self.location?,
            is_active: self.is_active.unwrap_or(true),
        })
    }

    /// Supplied fields laid over `current`.
    pub fn merge(self, current: &VendingMachine) -> NewVendingMachine {
        NewVendingMachine {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            location: self.location.unwrap_or_else(|| current.location.clone()),
            is_active: self.is_active.unwrap_or(current.is_active),
        }
    }
}

impl VendingMachine {
    pub fn from_new(id: i32, new: NewVendingMachine) -> Self {
        Self {
            id,
            name: new.name,
            location: new.location,
            is_active: new.is_active,
        }
    }
}

impl FromRow for VendingMachine {
    fn from_row(row: &may_postgres::Row) -> Result<Self, may_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            location: row.try_get("location")?,
            is_active: row.try_get("is_active")?,
        })
    }
}
