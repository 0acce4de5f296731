use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ProductCode, Quantity};

use crate::transaction::TransactionType;

/// The four quantity-changing operations a caller can request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Incoming,
    Reserve,
    Release,
    Dispatch,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Incoming => "incoming",
            OperationKind::Reserve => "reserve",
            OperationKind::Release => "release",
            OperationKind::Dispatch => "dispatch",
        }
    }

    /// Audit record type emitted when an operation of this kind commits.
    pub fn transaction_type(self) -> TransactionType {
        match self {
            OperationKind::Incoming => TransactionType::Incoming,
            OperationKind::Reserve => TransactionType::Reserve,
            OperationKind::Release => TransactionType::Release,
            OperationKind::Dispatch => TransactionType::Dispatch,
        }
    }

    /// Notes written on the audit record when the caller supplies none.
    pub fn default_notes(self) -> &'static str {
        match self {
            OperationKind::Incoming => "Stock incoming",
            OperationKind::Reserve => "Stock reserved",
            OperationKind::Release => "Reserved stock released",
            OperationKind::Dispatch => "Stock dispatched",
        }
    }
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request to change one product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    pub kind: OperationKind,
    pub product_code: ProductCode,
    pub quantity: Quantity,
    pub reference_number: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl StockOperation {
    pub fn new(kind: OperationKind, product_code: ProductCode, quantity: Quantity) -> Self {
        Self {
            kind,
            product_code,
            quantity,
            reference_number: None,
            performed_by: None,
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference_number: impl Into<String>) -> Self {
        self.reference_number = Some(reference_number.into());
        self
    }

    pub fn performed_by(mut self, actor: impl Into<String>) -> Self {
        self.performed_by = Some(actor.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Notes for the audit record: the caller's, or the kind's default.
    pub fn notes_or_default(&self) -> String {
        self.notes
            .clone()
            .unwrap_or_else(|| self.kind.default_notes().to_string())
    }
}

/// Unvalidated operation body as a request layer would decode it.
///
/// The product code and the operation kind come from the route, not the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockOperationRequest {
    pub quantity: Option<Decimal>,
    pub reference_number: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl StockOperationRequest {
    pub fn into_operation(
        self,
        kind: OperationKind,
        product_code: &str,
    ) -> Result<StockOperation, DomainError> {
        let product_code = ProductCode::parse(product_code)?;
        let quantity = Quantity::required(self.quantity)?;
        Ok(StockOperation {
            kind,
            product_code,
            quantity,
            reference_number: non_blank(self.reference_number),
            performed_by: non_blank(self.performed_by),
            notes: non_blank(self.notes),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_decodes_from_camel_case_json() {
        let req: StockOperationRequest = serde_json::from_str(
            r#"{"quantity":"12.5","referenceNumber":"PO-7","performedBy":"alice"}"#,
        )
        .unwrap();
        let op = req.into_operation(OperationKind::Incoming, "SKU1").unwrap();
        assert_eq!(op.quantity.value(), Decimal::new(125, 1));
        assert_eq!(op.reference_number.as_deref(), Some("PO-7"));
        assert_eq!(op.performed_by.as_deref(), Some("alice"));
        assert_eq!(op.notes_or_default(), "Stock incoming");
    }

    #[test]
    fn request_without_quantity_is_rejected() {
        let err = StockOperationRequest::default()
            .into_operation(OperationKind::Reserve, "SKU1")
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn request_with_blank_code_is_rejected() {
        let req = StockOperationRequest {
            quantity: Some(Decimal::ONE),
            ..Default::default()
        };
        let err = req.into_operation(OperationKind::Dispatch, " ").unwrap_err();
        assert!(matches!(err, DomainError::InvalidProductCode(_)));
    }

    #[test]
    fn caller_notes_override_defaults() {
        let op = StockOperation::new(
            OperationKind::Release,
            ProductCode::parse("SKU1").unwrap(),
            Quantity::try_from(1_i64).unwrap(),
        );
        assert_eq!(op.notes_or_default(), "Reserved stock released");
        assert_eq!(op.with_notes("order cancelled").notes_or_default(), "order cancelled");
    }
}
