//! Fixed-size PostgreSQL connection pool.
//!
//! Connections are opened eagerly by [`ConnectionPool::open`] and handed out
//! as [`PooledConnection`] guards that go back to the pool on drop.

mod manager;

pub use manager::{ConnectionPool, PoolError, PooledConnection};
