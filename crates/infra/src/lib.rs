//! Infrastructure layer: the ledger engine, its stores, config and read queries.

pub mod config;
pub mod error;
pub mod ledger_engine;
pub mod query;
pub mod store;


pub use config::{open_store, ConfigError, EngineConfig, StockConfig, StoreBackend};
pub use error::{StockError, StockErrorKind};
pub use ledger_engine::StockLedgerEngine;
pub use query::{Pagination, StockQueries, TransactionPage};
pub use store::{
    CommittedChange, InMemoryStockStore, LedgerChange, LedgerStore, PostgresStockStore,
    StockStore, StoreError, TransactionLog, Versioned,
};
