//! Persistence for the four inventory tables.
//!
//! [`EntityStore`] opens units of work; a [`StoreTx`] reads and writes rows
//! inside one. Both implementations enforce the same constraints: unique
//! names, a unique (vending machine, product) pair per stock row, existing
//! references for stock rows and non-negative numbers. Deleting a machine or
//! a product removes its stock rows; ledger rows are never touched.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::model::{
    NewProduct, NewStock, NewStockTimeline, NewVendingMachine, Product, Stock, StockTimeline,
    VendingMachine,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would break a unique, reference or check constraint.
    #[error("integrity error: {0}")]
    Integrity(String),
    /// No database connection became free in time.
    #[error("store unavailable: {0}")]
    PoolTimeout(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// A source of store transactions.
pub trait EntityStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`StoreTx::commit`] discards its writes.
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError>;

    /// Whether the backend can currently serve requests.
    fn check_health(&self) -> Result<(), StoreError>;
}

/// Row access inside one transaction. Lists are ordered by id.
pub trait StoreTx {
    fn list_machines(&mut self) -> Result<Vec<VendingMachine>, StoreError>;
    fn get_machine(&mut self, id: i32) -> Result<Option<VendingMachine>, StoreError>;
    fn find_machine_by_name(&mut self, name: &str) -> Result<Option<VendingMachine>, StoreError>;
    fn insert_machine(&mut self, new: &NewVendingMachine) -> Result<VendingMachine, StoreError>;
    fn update_machine(
        &mut self,
        id: i32,
        fields: &NewVendingMachine,
    ) -> Result<Option<VendingMachine>, StoreError>;
    /// Also deletes the machine's stock rows.
    fn delete_machine(&mut self, id: i32) -> Result<bool, StoreError>;

    fn list_products(&mut self) -> Result<Vec<Product>, StoreError>;
    fn get_product(&mut self, id: i32) -> Result<Option<Product>, StoreError>;
    fn find_product_by_name(&mut self, name: &str) -> Result<Option<Product>, StoreError>;
    fn insert_product(&mut self, new: &NewProduct) -> Result<Product, StoreError>;
    fn update_product(&mut self, id: i32, fields: &NewProduct) -> Result<Option<Product>, StoreError>;
    /// Also deletes the product's stock rows.
    fn delete_product(&mut self, id: i32) -> Result<bool, StoreError>;

    fn list_stocks(&mut self) -> Result<Vec<Stock>, StoreError>;
    fn get_stock(&mut self, id: i32) -> Result<Option<Stock>, StoreError>;
    fn find_stock_by_pair(
        &mut self,
        vending_machine: i32,
        product: i32,
    ) -> Result<Option<Stock>, StoreError>;
    fn insert_stock(&mut self, new: &NewStock) -> Result<Stock, StoreError>;
    fn update_stock(&mut self, id: i32, fields: &NewStock) -> Result<Option<Stock>, StoreError>;
    fn delete_stock(&mut self, id: i32) -> Result<bool, StoreError>;

    fn list_timelines(&mut self) -> Result<Vec<StockTimeline>, StoreError>;
    fn get_timeline(&mut self, id: i32) -> Result<Option<StockTimeline>, StoreError>;
    fn insert_timeline(&mut self, new: &NewStockTimeline) -> Result<StockTimeline, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
