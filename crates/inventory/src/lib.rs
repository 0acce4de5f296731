//! Stock ledger domain module.
//!
//! This crate contains the business rules for per-product stock quantities,
//! implemented purely as deterministic domain logic (no IO, no storage, no clock).
//! Callers pass the current ledger state and an operation in, and get back the next
//! state plus the audit record describing it.

pub mod ledger;
pub mod operation;
pub mod transaction;

pub use ledger::{LedgerFields, StockLedger, StockMovement, StockRuleViolation};
pub use operation::{OperationKind, StockOperation, StockOperationRequest};
pub use transaction::{NewTransaction, StockTransaction, TransactionType};
