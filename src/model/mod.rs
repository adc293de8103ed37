//! Entities, their column values and request-field parsing.
//!
//! Each entity has a record type (a stored row, serialised in API
//! responses), a `New*` type with the column values for a write, and a
//! patch/input type produced by validating a request body.

pub mod product;
pub mod stock;
pub mod stock_timeline;
pub mod validation;
pub mod vending_machine;

pub use product::{NewProduct, Product, ProductPatch};
pub use stock::{NewStock, Stock, StockPatch};
pub use stock_timeline::{NewStockTimeline, StockTimeline, StockTimelineInput};
pub use validation::FieldErrors;
pub use vending_machine::{NewVendingMachine, VendingMachine, VendingMachinePatch};
