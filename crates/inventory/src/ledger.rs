use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use stockledger_core::ProductCode;

use crate::operation::{OperationKind, StockOperation};
use crate::transaction::NewTransaction;

/// Rejections produced while deciding an operation against a ledger.
///
/// Every variant is detected before any state is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockRuleViolation {
    /// Reserve/release/dispatch against a product code with no ledger.
    #[error("no stock ledger for product {0}")]
    UnknownProduct(ProductCode),

    #[error("insufficient available stock for {product_code}: requested {requested}, available {available}")]
    InsufficientAvailable {
        product_code: ProductCode,
        requested: Decimal,
        available: Decimal,
    },

    #[error("cannot release more than reserved for {product_code}: requested {requested}, reserved {reserved}")]
    OverRelease {
        product_code: ProductCode,
        requested: Decimal,
        reserved: Decimal,
    },

    #[error("quantity must be reserved before dispatch for {product_code}: requested {requested}, reserved {reserved}")]
    DispatchExceedsReserved {
        product_code: ProductCode,
        requested: Decimal,
        reserved: Decimal,
    },

    /// Decimal arithmetic left the representable range.
    #[error("stock quantity overflow for {0}")]
    QuantityOverflow(ProductCode),

    /// Operation aimed at a different ledger than the one supplied.
    #[error("operation targets {operation}, ledger is {ledger}")]
    ProductMismatch {
        operation: ProductCode,
        ledger: ProductCode,
    },

    /// A computed or restored state broke a ledger invariant.
    #[error("stock ledger invariant violated for {product_code}: {reason}")]
    InvariantBreach {
        product_code: ProductCode,
        reason: &'static str,
    },
}

/// Current stock position of one product.
///
/// Quantities only change through [`StockLedger::decide`], which also keeps
/// `available_stock` equal to `current_stock - reserved_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLedger {
    product_code: ProductCode,
    product_name: String,
    current_stock: Decimal,
    reserved_stock: Decimal,
    available_stock: Decimal,
    incoming_stock: Decimal,
    unit: Option<String>,
    reorder_level: Option<Decimal>,
    last_updated: DateTime<Utc>,
}

/// Raw persisted columns, used by stores to rebuild a ledger.
///
/// There is deliberately no `available_stock` here: it is always recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFields {
    pub product_code: ProductCode,
    pub product_name: String,
    pub current_stock: Decimal,
    pub reserved_stock: Decimal,
    pub incoming_stock: Decimal,
    pub unit: Option<String>,
    pub reorder_level: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

/// Outcome of a successful decision: the next state and its audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub ledger: StockLedger,
    pub transaction: NewTransaction,
}

impl StockLedger {
    /// A ledger with every quantity at zero.
    pub fn open(
        product_code: ProductCode,
        product_name: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_code,
            product_name: product_name.into(),
            current_stock: Decimal::ZERO,
            reserved_stock: Decimal::ZERO,
            available_stock: Decimal::ZERO,
            incoming_stock: Decimal::ZERO,
            unit: None,
            reorder_level: None,
            last_updated: at,
        }
    }

    /// Name given to ledgers created implicitly by a first incoming delivery.
    pub fn default_name(product_code: &ProductCode) -> String {
        format!("Product {product_code}")
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_reorder_level(mut self, reorder_level: Decimal) -> Self {
        self.reorder_level = Some(reorder_level);
        self
    }

    /// Rebuild a ledger from stored columns, rejecting states no operation could produce.
    pub fn restore(fields: LedgerFields) -> Result<Self, StockRuleViolation> {
        let mut ledger = Self {
            product_code: fields.product_code,
            product_name: fields.product_name,
            current_stock: fields.current_stock,
            reserved_stock: fields.reserved_stock,
            available_stock: Decimal::ZERO,
            incoming_stock: fields.incoming_stock,
            unit: fields.unit,
            reorder_level: fields.reorder_level,
            last_updated: fields.last_updated,
        };
        ledger.recompute_available();
        ledger.ensure_invariants()?;
        Ok(ledger)
    }

    pub fn product_code(&self) -> &ProductCode {
        &self.product_code
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn reserved_stock(&self) -> Decimal {
        self.reserved_stock
    }

    pub fn available_stock(&self) -> Decimal {
        self.available_stock
    }

    pub fn incoming_stock(&self) -> Decimal {
        self.incoming_stock
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn reorder_level(&self) -> Option<Decimal> {
        self.reorder_level
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// `current_stock <= reorder_level`, only when a reorder level is set.
    pub fn is_low_stock(&self) -> bool {
        self.reorder_level
            .is_some_and(|level| self.current_stock <= level)
    }

    /// Decide an operation against the current state (`None` when no ledger exists).
    ///
    /// An incoming delivery for an unknown product opens a ledger named with
    /// [`StockLedger::default_name`]; every other kind requires an existing ledger.
    /// Pure: neither `current` nor anything else is mutated.
    pub fn decide(
        current: Option<&StockLedger>,
        op: &StockOperation,
        at: DateTime<Utc>,
    ) -> Result<StockMovement, StockRuleViolation> {
        let base = match (current, op.kind) {
            (Some(ledger), _) => {
                if ledger.product_code != op.product_code {
                    return Err(StockRuleViolation::ProductMismatch {
                        operation: op.product_code.clone(),
                        ledger: ledger.product_code.clone(),
                    });
                }
                ledger.clone()
            }
            (None, OperationKind::Incoming) => StockLedger::open(
                op.product_code.clone(),
                StockLedger::default_name(&op.product_code),
                at,
            ),
            (None, _) => return Err(StockRuleViolation::UnknownProduct(op.product_code.clone())),
        };
        base.transition(op, at)
    }

    fn transition(
        mut self,
        op: &StockOperation,
        at: DateTime<Utc>,
    ) -> Result<StockMovement, StockRuleViolation> {
        let qty = op.quantity.value();

        let balance_after = match op.kind {
            OperationKind::Incoming => {
                self.incoming_stock = self.checked_add(self.incoming_stock, qty)?;
                self.current_stock = self.checked_add(self.current_stock, qty)?;
                self.current_stock
            }
            OperationKind::Reserve => {
                let available = self.current_stock - self.reserved_stock;
                if qty > available {
                    return Err(StockRuleViolation::InsufficientAvailable {
                        product_code: self.product_code,
                        requested: qty,
                        available,
                    });
                }
                self.reserved_stock += qty;
                self.reserved_stock
            }
            OperationKind::Release => {
                if qty > self.reserved_stock {
                    return Err(StockRuleViolation::OverRelease {
                        product_code: self.product_code,
                        requested: qty,
                        reserved: self.reserved_stock,
                    });
                }
                self.reserved_stock -= qty;
                self.reserved_stock
            }
            OperationKind::Dispatch => {
                if qty > self.reserved_stock {
                    return Err(StockRuleViolation::DispatchExceedsReserved {
                        product_code: self.product_code,
                        requested: qty,
                        reserved: self.reserved_stock,
                    });
                }
                self.reserved_stock -= qty;
                self.current_stock -= qty;
                self.current_stock
            }
        };

        self.recompute_available();
        self.last_updated = at;
        self.ensure_invariants()?;

        let transaction = NewTransaction {
            product_code: self.product_code.clone(),
            transaction_type: op.kind.transaction_type(),
            quantity: qty,
            balance_after,
            reference_number: op.reference_number.clone(),
            notes: Some(op.notes_or_default()),
            performed_by: op.performed_by.clone(),
            transaction_date: at,
        };

        Ok(StockMovement {
            ledger: self,
            transaction,
        })
    }

    fn checked_add(&self, a: Decimal, b: Decimal) -> Result<Decimal, StockRuleViolation> {
        a.checked_add(b)
            .ok_or_else(|| StockRuleViolation::QuantityOverflow(self.product_code.clone()))
    }

    // Sole writer of `available_stock`.
    fn recompute_available(&mut self) {
        self.available_stock = self.current_stock - self.reserved_stock;
    }

    fn ensure_invariants(&self) -> Result<(), StockRuleViolation> {
        let breach = |reason| StockRuleViolation::InvariantBreach {
            product_code: self.product_code.clone(),
            reason,
        };
        if self.current_stock < Decimal::ZERO {
            return Err(breach("current stock is negative"));
        }
        if self.reserved_stock < Decimal::ZERO {
            return Err(breach("reserved stock is negative"));
        }
        if self.reserved_stock > self.current_stock {
            return Err(breach("reserved stock exceeds current stock"));
        }
        if self.incoming_stock < Decimal::ZERO {
            return Err(breach("incoming stock is negative"));
        }
        if self.available_stock != self.current_stock - self.reserved_stock {
            return Err(breach("available stock drifted from current minus reserved"));
        }
        Ok(())
    }
}
