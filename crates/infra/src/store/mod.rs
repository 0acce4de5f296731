//! Durable storage boundary for stock ledgers and their audit trail.
//!
//! The engine only talks to these traits. Two adapters ship with the crate:
//! an in-memory store for tests/dev and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use r#trait::{
    CommittedChange, LedgerChange, LedgerStore, StockStore, StoreError, TransactionLog, Versioned,
};
