//! Public error taxonomy of the stock ledger.
//!
//! Everything the engine and query surface return funnels into [`StockError`]. Request
//! layers should branch on [`StockError::kind`] rather than on variants so that the
//! mapping to "bad request" / "not found" stays stable as variants grow.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{DomainError, ProductCode};
use stockledger_inventory::StockRuleViolation;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum StockError {
    /// Input rejected before any store access (quantity, product code, record id).
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error("no stock ledger for product {0}")]
    NotFound(ProductCode),

    #[error("insufficient available stock for {product_code}: requested {requested}, available {available}")]
    InsufficientAvailable {
        product_code: ProductCode,
        requested: Decimal,
        available: Decimal,
    },

    #[error("cannot release {requested} of {product_code}: only {reserved} reserved")]
    OverRelease {
        product_code: ProductCode,
        requested: Decimal,
        reserved: Decimal,
    },

    #[error("cannot dispatch {requested} of {product_code}: only {reserved} reserved")]
    DispatchExceedsReserved {
        product_code: ProductCode,
        requested: Decimal,
        reserved: Decimal,
    },

    /// Any other rule the ledger refused (overflow, invariant breach).
    #[error(transparent)]
    Rule(StockRuleViolation),

    /// Every commit attempt lost the race against a concurrent writer.
    #[error("gave up on {product_code} after {attempts} conflicting commit attempts")]
    ConcurrencyExhausted {
        product_code: ProductCode,
        attempts: u32,
    },

    #[error("stock store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl From<StockRuleViolation> for StockError {
    fn from(value: StockRuleViolation) -> Self {
        match value {
            StockRuleViolation::UnknownProduct(code) => StockError::NotFound(code),
            StockRuleViolation::InsufficientAvailable {
                product_code,
                requested,
                available,
            } => StockError::InsufficientAvailable {
                product_code,
                requested,
                available,
            },
            StockRuleViolation::OverRelease {
                product_code,
                requested,
                reserved,
            } => StockError::OverRelease {
                product_code,
                requested,
                reserved,
            },
            StockRuleViolation::DispatchExceedsReserved {
                product_code,
                requested,
                reserved,
            } => StockError::DispatchExceedsReserved {
                product_code,
                requested,
                reserved,
            },
            other => StockError::Rule(other),
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        StockError::StoreUnavailable(value)
    }
}

/// Stable classification of a [`StockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockErrorKind {
    NotFound,
    InsufficientAvailable,
    OverRelease,
    DispatchExceedsReserved,
    InvalidQuantity,
    InvalidProductCode,
    InvalidId,
    RuleViolation,
    ConcurrencyExhausted,
    StoreUnavailable,
}

impl StockErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StockErrorKind::NotFound => "NOT_FOUND",
            StockErrorKind::InsufficientAvailable => "INSUFFICIENT_AVAILABLE",
            StockErrorKind::OverRelease => "OVER_RELEASE",
            StockErrorKind::DispatchExceedsReserved => "DISPATCH_EXCEEDS_RESERVED",
            StockErrorKind::InvalidQuantity => "INVALID_QUANTITY",
            StockErrorKind::InvalidProductCode => "INVALID_PRODUCT_CODE",
            StockErrorKind::InvalidId => "INVALID_ID",
            StockErrorKind::RuleViolation => "RULE_VIOLATION",
            StockErrorKind::ConcurrencyExhausted => "CONCURRENCY_EXHAUSTED",
            StockErrorKind::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }

    /// Failures the caller can fix by changing the request ("bad request").
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            StockErrorKind::InsufficientAvailable
                | StockErrorKind::OverRelease
                | StockErrorKind::DispatchExceedsReserved
                | StockErrorKind::InvalidQuantity
                | StockErrorKind::InvalidProductCode
                | StockErrorKind::InvalidId
        )
    }

    /// Failures that may succeed if the same request is simply tried again later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StockErrorKind::ConcurrencyExhausted | StockErrorKind::StoreUnavailable
        )
    }
}

impl std::fmt::Display for StockErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StockError {
    pub fn kind(&self) -> StockErrorKind {
        match self {
            StockError::Validation(DomainError::InvalidQuantity(_)) => {
                StockErrorKind::InvalidQuantity
            }
            StockError::Validation(DomainError::InvalidProductCode(_)) => {
                StockErrorKind::InvalidProductCode
            }
            StockError::Validation(DomainError::InvalidId(_)) => StockErrorKind::InvalidId,
            StockError::NotFound(_) => StockErrorKind::NotFound,
            StockError::InsufficientAvailable { .. } => StockErrorKind::InsufficientAvailable,
            StockError::OverRelease { .. } => StockErrorKind::OverRelease,
            StockError::DispatchExceedsReserved { .. } => {
                StockErrorKind::DispatchExceedsReserved
            }
            StockError::Rule(_) => StockErrorKind::RuleViolation,
            StockError::ConcurrencyExhausted { .. } => StockErrorKind::ConcurrencyExhausted,
            StockError::StoreUnavailable(_) => StockErrorKind::StoreUnavailable,
        }
    }
}
