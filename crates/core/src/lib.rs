//! `stockledger-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, quantities, the optimistic concurrency token and the domain error.

pub mod concurrency;
pub mod error;
pub mod id;
pub mod quantity;

pub use concurrency::{ExpectedVersion, Version};
pub use error::{DomainError, DomainResult};
pub use id::{ProductCode, TransactionId};
pub use quantity::Quantity;
