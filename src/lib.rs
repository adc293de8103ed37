//! # vendstock
//!
//! Inventory tracking for vending machines: machines, the products they
//! dispense, per-machine stock levels and an append-only ledger of every
//! stock write.
//!
//! The crate is layered the same way requests flow through it:
//!
//! - [`http`] parses raw requests and routes them to a [`handlers::Resource`]
//! - [`handlers`] validate input against [`model`] and drive a store transaction
//! - [`ledger`] appends the stock timeline entry inside that transaction
//! - [`store`] persists rows, either in PostgreSQL ([`store::PgStore`]) or
//!   in process ([`store::MemoryStore`])
//!
//! PostgreSQL access goes through [`connection`], [`pool`], [`executor`] and
//! [`transaction`], and the schema is owned by [`migration`].

pub mod config;
pub mod connection;
pub mod executor;
pub mod handlers;
pub mod http;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod query;
pub mod store;
pub mod transaction;

pub use config::AppConfig;
pub use connection::{connect, ConnectionError};
pub use executor::{ExecError, MayPostgresExecutor, SqlExecutor};
pub use handlers::Resource;
pub use http::{ApiResponse, Router, VendstockService};
pub use ledger::record_stock_write;
pub use model::{Product, Stock, StockTimeline, VendingMachine};
pub use pool::ConnectionPool;
pub use store::{EntityStore, MemoryStore, PgStore, StoreError, StoreTx};
